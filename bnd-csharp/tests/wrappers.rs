//! Managed wrappers: proxies, handlers and structures.

mod common;

use std::sync::LazyLock;

use bnd_csharp::error::GenError;
use bnd_csharp::model::{CType, FieldDescriptor, ParamDescriptor, SourceInfo};
use bnd_csharp::output::GeneratedTree;
use common::file;

static TREE: LazyLock<GeneratedTree> = LazyLock::new(common::generate);

#[test]
fn proxy_shape() {
    let text = file(&TREE, "Managed/Types/CefBrowser.cs");
    assert!(text.contains("using Cef.Native;"), "{text}");
    assert!(
        text.contains("public unsafe partial class CefBrowser : CefBaseRefCounted<cef_browser_t>"),
        "{text}"
    );
    assert!(text.contains("internal CefBrowser(cef_browser_t* instance)"), "{text}");
    assert!(text.contains(": base(instance)"), "{text}");
    assert!(text.contains("internal static CefBrowser Wrap(cef_browser_t* instance)"), "{text}");
    assert!(
        text.contains("CefBrowser existing = CefWrapperRegistry.GetInstance(instance) as CefBrowser;"),
        "{text}"
    );
    assert!(text.contains("((cef_base_ref_counted_t*)instance)->Release();"), "{text}");
}

#[test]
fn proxy_accessors_become_properties() {
    let text = file(&TREE, "Managed/Types/CefBrowser.cs");
    assert!(text.contains("public bool IsLoading"), "{text}");
    assert!(text.contains("return NativeInstance->IsLoading() != 0;"), "{text}");
    assert!(text.contains("public int Identifier"), "{text}");
    assert!(text.contains("public UIntPtr FrameCount"), "{text}");

    // Owned string getter paired with a borrowed string setter.
    assert!(text.contains("[NativeName(\"get_url\")]"), "{text}");
    assert!(text.contains("public string Url"), "{text}");
    assert!(text.contains("return CefString.ReadAndFree(NativeInstance->GetUrl());"), "{text}");
    assert!(text.contains("cef_string_t n_url = CefString.Create(value);"), "{text}");
    assert!(text.contains("NativeInstance->SetUrl(&n_url);"), "{text}");
    assert!(text.contains("CefString.Free(&n_url);"), "{text}");
    assert!(!text.contains("public string GetUrl()"), "{text}");
    assert!(!text.contains("public void SetUrl("), "{text}");
}

#[test]
fn proxy_methods_fuse_count_and_array() {
    let text = file(&TREE, "Managed/Types/CefBrowser.cs");
    assert!(text.contains("public void Reload()"), "{text}");
    assert!(text.contains("NativeInstance->Reload();"), "{text}");
    assert!(
        text.contains("public void GetFrameIdentifiers(ref UIntPtr identifiersCount, long[] identifiers)"),
        "{text}"
    );
    assert!(
        text.contains("int n_identifiers_length = identifiers != null ? identifiers.Length : 0;"),
        "{text}"
    );
    assert!(text.contains("UIntPtr n_identifiersCount = identifiersCount;"), "{text}");
    assert!(
        text.contains("NativeInstance->GetFrameIdentifiers(&n_identifiersCount, n_identifiers);"),
        "{text}"
    );
    assert!(text.contains("identifiersCount = n_identifiersCount;"), "{text}");
    assert!(text.contains("CefStructure.Free(n_identifiers);"), "{text}");
}

#[test]
fn scoped_proxy_does_not_release() {
    let text = file(&TREE, "Managed/Types/CefTaskInfo.cs");
    assert!(
        text.contains("public unsafe partial class CefTaskInfo : CefBaseScoped<cef_task_info_t>"),
        "{text}"
    );
    assert!(text.contains("public string Name"), "{text}");
    assert!(!text.contains("->Release();"), "{text}");
}

#[test]
fn handler_shape() {
    let text = file(&TREE, "Managed/Types/CefApp.cs");
    assert!(
        text.contains("public unsafe partial class CefApp : CefBaseRefCounted<cef_app_t>, ICefAppPrivate"),
        "{text}"
    );
    assert!(text.contains("public CefApp()"), "{text}");
    assert!(
        text.contains(": base((cef_app_t*)CefStructure.Allocate(sizeof(cef_app_t)))"),
        "{text}"
    );
    assert!(text.contains("cef_app_t* self = NativeInstance;"), "{text}");
    assert!(
        text.contains("self->can_close = (void*)(delegate* unmanaged[Cdecl]<cef_app_t*, int>)&CanCloseImpl;"),
        "{text}"
    );
    assert!(
        text.contains("self->can_close = (void*)Marshal.GetFunctionPointerForDelegate(fnCanClose);"),
        "{text}"
    );
    assert!(
        text.contains("private static readonly CanCloseDelegate fnCanClose = CanCloseImpl;"),
        "{text}"
    );
    assert!(text.contains("internal static CefApp Wrap(cef_app_t* instance)"), "{text}");
}

#[test]
fn handler_virtual_methods_have_defaults() {
    let text = file(&TREE, "Managed/Types/CefApp.cs");
    assert!(text.contains("[NativeName(\"can_close\")]"), "{text}");
    assert!(text.contains("protected internal virtual bool CanClose()"), "{text}");
    assert!(text.contains("return default;"), "{text}");
    assert!(
        text.contains(
            "protected internal virtual void OnBeforeCommandLineProcessing(string processType, CefBrowser browser)"
        ),
        "{text}"
    );
    assert!(text.contains("protected internal virtual string GetDefaultTitle()"), "{text}");
    assert!(text.contains("protected internal virtual void OnRects(CefRect[] rects)"), "{text}");
}

#[test]
fn only_skippable_callbacks_get_override_queries() {
    let text = file(&TREE, "Managed/Types/CefApp.cs");
    assert!(text.contains("internal interface ICefAppPrivate"), "{text}");
    assert!(text.contains("bool IsOverriddenCanClose();"), "{text}");
    assert!(text.contains("bool IsOverriddenOnRects();"), "{text}");
    assert!(text.contains("bool IsOverriddenOnBeforeCommandLineProcessing();"), "{text}");
    assert!(text.contains("[MethodImpl(MethodImplOptions.ForwardRef)]"), "{text}");
    assert!(text.contains("extern bool ICefAppPrivate.IsOverriddenCanClose();"), "{text}");
    // An owned string cannot be answered with a default value.
    assert!(!text.contains("IsOverriddenGetDefaultTitle"), "{text}");
}

#[test]
fn handler_thunks_marshal_into_managed_calls() {
    let text = file(&TREE, "Managed/Types/CefApp.cs");
    assert!(
        text.contains("#if !NET_LESS_5_0\n\t\t[UnmanagedCallersOnly(CallConvs = new[] { typeof(CallConvCdecl) })]\n#endif"),
        "{text}"
    );
    assert!(text.contains("private static int CanCloseImpl(cef_app_t* self)"), "{text}");
    assert!(
        text.contains("CefApp wrapper = CefWrapperRegistry.GetInstance(self) as CefApp;"),
        "{text}"
    );
    assert!(
        text.contains("if (wrapper == null || !((ICefAppPrivate)wrapper).IsOverriddenCanClose())"),
        "{text}"
    );
    assert!(text.contains("bool managedResult = wrapper.CanClose();"), "{text}");
    assert!(text.contains("return (int)(managedResult ? 1 : 0);"), "{text}");

    assert!(text.contains("((cef_base_ref_counted_t*)browser)->Release();"), "{text}");
    assert!(
        text.contains(
            "wrapper.OnBeforeCommandLineProcessing(CefString.Read(process_type), CefBrowser.Wrap(browser));"
        ),
        "{text}"
    );

    assert!(
        text.contains("private static cef_string_userfree_t GetDefaultTitleImpl(cef_app_t* self)"),
        "{text}"
    );
    assert!(text.contains("return CefString.CreateUserfree(managedResult);"), "{text}");
}

#[test]
fn handler_thunk_rebuilds_arrays() {
    let text = file(&TREE, "Managed/Types/CefApp.cs");
    assert!(
        text.contains("private static void OnRectsImpl(cef_app_t* self, UIntPtr rectsCount, cef_rect_t* rects)"),
        "{text}"
    );
    assert!(text.contains("CefRect[] m_rects = new CefRect[(int)rectsCount];"), "{text}");
    assert!(text.contains("m_rects[i] = new CefRect(rects[i]);"), "{text}");
    assert!(text.contains("wrapper.OnRects(m_rects);"), "{text}");
}

#[test]
fn table_listed_handler() {
    let text = file(&TREE, "Managed/Types/CefClient.cs");
    assert!(
        text.contains("public unsafe partial class CefClient : CefBaseRefCounted<cef_client_t>, ICefClientPrivate"),
        "{text}"
    );
    assert!(text.contains("protected internal virtual CefBrowser GetBrowser()"), "{text}");
    assert!(
        text.contains("return managedResult != null ? managedResult.GetNativeInstance() : null;"),
        "{text}"
    );
}

#[test]
fn sized_struct_becomes_disposable_class() {
    let text = file(&TREE, "Managed/Types/CefSettings.cs");
    assert!(
        text.contains("public sealed unsafe partial class CefSettings : IDisposable"),
        "{text}"
    );
    assert!(text.contains("private cef_settings_t* _instance;"), "{text}");
    assert!(
        text.contains("_instance = (cef_settings_t*)CefStructure.Allocate(sizeof(cef_settings_t));"),
        "{text}"
    );
    assert!(text.contains("_instance->size = (UIntPtr)sizeof(cef_settings_t);"), "{text}");
    assert!(text.contains("public bool NoSandbox"), "{text}");
    assert!(text.contains("return _instance->no_sandbox != 0;"), "{text}");
    assert!(text.contains("_instance->no_sandbox = (int)(value ? 1 : 0);"), "{text}");
    assert!(text.contains("public CefLogSeverity LogSeverity"), "{text}");
    assert!(text.contains("public string CachePath"), "{text}");
    assert!(text.contains("return CefString.Read(&_instance->cache_path);"), "{text}");
    assert!(text.contains("CefString.Clear(&_instance->cache_path);"), "{text}");
    assert!(text.contains("public void Dispose()"), "{text}");
    assert!(!text.contains("public UIntPtr Size"), "{text}");
}

#[test]
fn simple_struct_becomes_value_type() {
    let text = file(&TREE, "Managed/Types/CefRect.cs");
    assert!(text.contains("public unsafe partial struct CefRect"), "{text}");
    assert!(text.contains("internal cef_rect_t _instance;"), "{text}");
    assert!(text.contains("public CefRect(cef_rect_t instance)"), "{text}");
    assert!(text.contains("public int Width"), "{text}");
    assert!(text.contains("return _instance.width;"), "{text}");
    assert!(text.contains("_instance.width = value;"), "{text}");
}

#[test]
fn runtime_types_are_not_wrapped() {
    for name in ["CefString", "CefBaseRefCounted", "CefBaseScoped", "CefStringUserfree"] {
        let path = format!("Managed/Types/{name}.cs");
        assert!(TREE.get(&path).is_none(), "{path} should not be generated");
    }
}

/// The fixture plus one ref-counted record `name` carrying `callbacks`.
fn with_record(name: &str, source: SourceInfo, callbacks: Vec<FieldDescriptor>) -> anyhow::Result<GeneratedTree> {
    let mut model = common::model();
    let mut fields = vec![FieldDescriptor::data(
        "base",
        CType::named("cef_base_ref_counted_t"),
    )];
    fields.extend(callbacks);
    common::record(&mut model, name, source, fields);
    common::generate_with(&model, common::tables(), &[])
}

fn library_source() -> SourceInfo {
    SourceInfo::new("include/capi/cef_extra_capi.h")
}

#[test]
fn value_copies_duplicate_owned_strings() {
    let text = file(&TREE, "Managed/Types/CefSettings.cs");
    let copy = text
        .find("internal CefSettings(cef_settings_t value)")
        .expect("by-value constructor");
    let body = &text[copy..];
    let assign = body.find("*_instance = value;").expect("block copy");
    let reset = body
        .find("_instance->cache_path = default(cef_string_t);")
        .expect("string slot reset");
    let replace = body
        .find("CefString.Replace(&_instance->cache_path, CefString.Read(&value.cache_path));")
        .expect("string copy");
    assert!(assign < reset && reset < replace, "{text}");
}

#[test]
fn handler_arrays_of_blocks_are_copied() {
    let tree = with_record(
        "cef_settings_observer_t",
        library_source().with_marker(common::CLIENT_MARKER),
        vec![common::callback(
            "on_settings",
            "cef_settings_observer_t",
            vec![
                ParamDescriptor::new("itemsCount", common::size_t()),
                ParamDescriptor::new("items", CType::const_ptr(CType::named("cef_settings_t"))),
            ],
            CType::Void,
        )],
    )
    .expect("generate with observer");
    let text = file(&tree, "Managed/Types/CefSettingsObserver.cs");
    assert!(text.contains("m_items[i] = new CefSettings(items[i]);"), "{text}");

    // The copies own duplicated strings, never the caller's buffers.
    let settings = file(&tree, "Managed/Types/CefSettings.cs");
    assert!(settings.contains("CefString.Read(&value.cache_path)"), "{settings}");
}

#[test]
fn proxy_fuses_count_passed_by_value() {
    let tree = with_record(
        "cef_sender_t",
        library_source(),
        vec![common::callback(
            "send",
            "cef_sender_t",
            vec![
                ParamDescriptor::new("itemsCount", common::size_t()),
                ParamDescriptor::new("items", CType::const_ptr(CType::I32)),
            ],
            CType::Void,
        )],
    )
    .expect("generate with sender");
    let text = file(&tree, "Managed/Types/CefSender.cs");
    assert!(text.contains("public void Send(int[] items)"), "{text}");
    assert!(text.contains("(UIntPtr)n_items_length"), "{text}");
    assert!(!text.contains("itemsCount"), "{text}");
}

#[test]
fn disagreeing_accessors_stay_methods() {
    let tree = with_record(
        "cef_volume_t",
        library_source(),
        vec![
            common::callback("get_level", "cef_volume_t", vec![], CType::F64),
            common::callback(
                "set_level",
                "cef_volume_t",
                vec![ParamDescriptor::new("level", CType::I32)],
                CType::Void,
            ),
        ],
    )
    .expect("generate with volume");
    let text = file(&tree, "Managed/Types/CefVolume.cs");
    assert!(text.contains("public double GetLevel()"), "{text}");
    assert!(text.contains("public void SetLevel(int level)"), "{text}");
    assert!(!text.contains("public double Level"), "{text}");
    assert!(!text.contains("public int Level"), "{text}");
}

#[test]
fn property_clashing_with_a_method_is_rejected() {
    let err = with_record(
        "cef_document_t",
        library_source(),
        vec![
            common::callback("get_title", "cef_document_t", vec![], CType::I32),
            common::callback("title", "cef_document_t", vec![], CType::Void),
        ],
    )
    .unwrap_err();
    match err.downcast_ref::<GenError>() {
        Some(GenError::ShapeMismatch { subject, detail }) => {
            assert_eq!(subject, "cef_document_t");
            assert!(detail.contains("property `Title` is ambiguous"), "{detail}");
        }
        other => panic!("expected a shape mismatch, got {other:?}: {err:#}"),
    }
}
