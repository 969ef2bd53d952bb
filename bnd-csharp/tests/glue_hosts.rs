//! Forwarding classes between hand-written hosts and generated handlers.

mod common;

use std::path::{Path, PathBuf};

use bnd_csharp::glue;
use common::file;

const APPLICATION: &str = r#"
// @glue-host
using Cef;

namespace Cef.Hosting
{
	public partial class CefApplication
	{
		internal void OnBeforeCommandLineProcessing(string processType, CefBrowser browser)
		{
		}

		internal bool CanClose()
		{
			return true;
		}

		internal bool AvoidCanClose()
		{
			return false;
		}

		internal void Shutdown()
		{
		}
	}
}
"#;

fn application() -> glue::GlueSource {
    glue::parse(PathBuf::from("Hosting/CefApplication.cs"), APPLICATION).expect("host class")
}

#[test]
fn host_is_parsed() {
    let source = application();
    assert_eq!(source.host, "CefApplication");
    assert_eq!(source.namespace.as_deref(), Some("Cef.Hosting"));
    let names: Vec<&str> = source.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["OnBeforeCommandLineProcessing", "CanClose", "Shutdown"]);
    assert!(source.gates.contains("CanClose"));
}

#[test]
fn forwarding_class_overrides_matching_callbacks() {
    let tree = common::generate_with(&common::model(), common::tables(), &[application()])
        .expect("generate with host");
    let text = file(&tree, "Managed/Internal/CefApplicationGlue.cs");

    assert!(text.contains("namespace Cef.Internal"), "{text}");
    assert!(
        text.contains("internal sealed unsafe class AppAppGlue : CefApp, ICefAppPrivate"),
        "{text}"
    );
    assert!(text.contains("private readonly CefApplication _host;"), "{text}");
    assert!(text.contains("internal AppAppGlue(CefApplication host)"), "{text}");
    assert!(
        text.contains(
            "protected internal override void OnBeforeCommandLineProcessing(string processType, CefBrowser browser)"
        ),
        "{text}"
    );
    assert!(
        text.contains("_host.OnBeforeCommandLineProcessing(processType, browser);"),
        "{text}"
    );
    assert!(text.contains("protected internal override bool CanClose()"), "{text}");
    assert!(text.contains("return _host.CanClose();"), "{text}");
    // Host methods without a matching callback are left alone.
    assert!(!text.contains("Shutdown"), "{text}");
}

#[test]
fn gates_answer_override_queries() {
    let tree = common::generate_with(&common::model(), common::tables(), &[application()])
        .expect("generate with host");
    let text = file(&tree, "Managed/Internal/CefApplicationGlue.cs");

    assert!(text.contains("bool ICefAppPrivate.IsOverriddenCanClose()"), "{text}");
    assert!(text.contains("return !_host.AvoidCanClose();"), "{text}");
    assert!(
        text.contains("bool ICefAppPrivate.IsOverriddenOnBeforeCommandLineProcessing()"),
        "{text}"
    );
    assert!(text.contains("return true;"), "{text}");

    assert!(text.contains("internal interface ICefApplicationPrivate"), "{text}");
    assert!(text.contains("bool AvoidCanClose();"), "{text}");
    assert!(text.contains("namespace Cef.Hosting"), "{text}");
    assert!(
        text.contains("partial class CefApplication : ICefApplicationPrivate"),
        "{text}"
    );
    assert!(text.contains("bool ICefApplicationPrivate.AvoidCanClose()"), "{text}");
    assert!(text.contains("return AvoidCanClose();"), "{text}");
}

#[test]
fn glue_provenance_names_host_and_header() {
    let tree = common::generate_with(&common::model(), common::tables(), &[application()])
        .expect("generate with host");
    let text = file(&tree, "Managed/Internal/CefApplicationGlue.cs");
    assert!(text.contains("//   Hosting/CefApplication.cs"), "{text}");
    assert!(text.contains(&format!("//   {}", common::APP_HEADER)), "{text}");
}

#[test]
fn ambiguous_host_method_is_a_shape_fault() {
    // `GetBrowser` with no parameters on a second handler makes the host
    // method match two handlers.
    let mut model = common::model();
    common::record(
        &mut model,
        "cef_popup_client_t",
        bnd_csharp::model::SourceInfo::new(common::CLIENT_HEADER).with_marker(common::CLIENT_MARKER),
        vec![
            bnd_csharp::model::FieldDescriptor::data(
                "base",
                bnd_csharp::model::CType::named("cef_base_ref_counted_t"),
            ),
            common::callback(
                "get_browser",
                "cef_popup_client_t",
                vec![],
                bnd_csharp::model::CType::ptr(bnd_csharp::model::CType::named("_cef_browser_t")),
            ),
        ],
    );
    let host = glue::parse(
        PathBuf::from("Hosting/WebView.cs"),
        "namespace Cef\n{\n\tpartial class WebView\n\t{\n\t\tinternal CefBrowser GetBrowser() { return null; }\n\t}\n}\n",
    )
    .expect("host class");
    let err = common::generate_with(&model, common::tables(), &[host]).unwrap_err();
    let text = format!("{err:#}");
    assert!(text.contains("several handlers"), "{text}");
}

#[test]
fn scan_reads_only_marked_files() {
    let root = tempfile::tempdir().expect("tempdir");
    let dir = root.path().join("Hosting");
    std::fs::create_dir_all(dir.join("Nested")).expect("create dirs");
    std::fs::write(dir.join("CefApplication.cs"), APPLICATION).expect("write host");
    std::fs::write(
        dir.join("Nested/Plain.cs"),
        "namespace Cef\n{\n\tpartial class Plain\n\t{\n\t}\n}\n",
    )
    .expect("write plain");

    let sources = glue::scan(&dir, root.path(), "// @glue-host").expect("scan");
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].host, "CefApplication");
    assert_eq!(sources[0].path, Path::new("Hosting/CefApplication.cs"));

    let missing = glue::scan(&root.path().join("absent"), root.path(), "// @glue-host")
        .expect("scan missing dir");
    assert!(missing.is_empty());
}
