//! Instruction-level override checks emitted for handler classes.

mod common;

use std::sync::LazyLock;

use bnd_csharp::config::Config;
use bnd_csharp::output::GeneratedTree;
use common::file;

static TREE: LazyLock<GeneratedTree> = LazyLock::new(common::generate);

#[test]
fn one_fragment_per_handler() {
    let overrides: Vec<String> = TREE
        .paths()
        .filter(|p| p.starts_with("Managed/Overrides"))
        .map(|p| p.display().to_string())
        .collect();
    assert_eq!(
        overrides,
        ["Managed/Overrides/CefApp.il", "Managed/Overrides/CefClient.il"]
    );
}

#[test]
fn class_header() {
    let text = file(&TREE, "Managed/Overrides/CefApp.il");
    assert!(text.contains(".class public auto ansi beforefieldinit Cef.CefApp\n"), "{text}");
    assert!(
        text.contains("\textends class Cef.CefBaseRefCounted`1<valuetype Cef.Native.cef_app_t>\n"),
        "{text}"
    );
    assert!(text.contains("\timplements Cef.ICefAppPrivate\n"), "{text}");
}

#[test]
fn routine_compares_dispatch_targets() {
    let text = file(&TREE, "Managed/Overrides/CefApp.il");
    let expected = "\
\t.method private hidebysig newslot virtual final
\t\tinstance bool Cef.ICefAppPrivate.IsOverriddenCanClose() cil managed
\t{
#ifdef WINDOWS
\t\t.custom instance void Cef.NativeCallbackAttribute::.ctor(string, string) = { string('can_close') string('stdcall') }
#endif
#ifndef WINDOWS
\t\t.custom instance void Cef.NativeCallbackAttribute::.ctor(string, string) = { string('can_close') string('cdecl') }
#endif
\t\t.override Cef.ICefAppPrivate::IsOverriddenCanClose
\t\t.maxstack 2
\t\tldarg.0
\t\tldvirtftn instance bool Cef.CefApp::CanClose()
\t\tldftn instance bool Cef.CefApp::CanClose()
\t\tceq
\t\tldc.i4.0
\t\tceq
\t\tret
\t}
";
    assert!(text.contains(expected), "{text}");
}

#[test]
fn parameters_are_spelled_for_the_assembler() {
    let text = file(&TREE, "Managed/Overrides/CefApp.il");
    assert!(
        text.contains(
            "ldvirtftn instance void Cef.CefApp::OnBeforeCommandLineProcessing(string, class Cef.CefBrowser)"
        ),
        "{text}"
    );
    assert!(
        text.contains("ldftn instance void Cef.CefApp::OnRects(valuetype Cef.CefRect[])"),
        "{text}"
    );
    assert!(!text.contains("GetDefaultTitle"), "{text}");

    let client = file(&TREE, "Managed/Overrides/CefClient.il");
    assert!(
        client.contains("ldvirtftn instance class Cef.CefBrowser Cef.CefClient::GetBrowser()"),
        "{client}"
    );
}

#[test]
fn forced_stdcall_drops_platform_tests() {
    let tree = bnd_csharp::generate_from_model(
        &common::model(),
        &Config::default(),
        common::tables(),
        true,
        &[],
    )
    .expect("generate with stdcall");
    let text = file(&tree, "Managed/Overrides/CefApp.il");
    assert!(!text.contains("#ifdef WINDOWS"), "{text}");
    assert!(!text.contains("'cdecl'"), "{text}");
    assert!(text.contains("string('can_close') string('stdcall')"), "{text}");
}
