use briny_dispatch::RuntimeError;
use briny_dispatch::extension::{self, NativeExtension};

#[test]
fn test_missing_extension_fails_deterministically() {
    if std::env::var_os("BRINY_NATIVE_EXTENSION").is_some() {
        return;
    }
    for x in [0, 1, -7] {
        assert!(matches!(
            extension::add_one(x),
            Err(RuntimeError::ExtensionUnavailable(_))
        ));
    }
    assert!(matches!(
        NativeExtension::from_env(),
        Err(RuntimeError::ExtensionUnavailable(_))
    ));
}

#[test]
fn test_library_without_symbol_is_unavailable() {
    // Any loadable system library that does not export `add_one`.
    let Ok(ext) = NativeExtension::open(if cfg!(target_os = "macos") {
        "libSystem.B.dylib"
    } else if cfg!(windows) {
        "kernel32.dll"
    } else {
        "libc.so.6"
    }) else {
        return;
    };
    assert!(matches!(
        ext.add_one(1),
        Err(RuntimeError::ExtensionUnavailable(_))
    ));
}
