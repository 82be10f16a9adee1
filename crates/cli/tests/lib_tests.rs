//! Tests for lib.rs constants

use vigil_cli::{APP_NAME, DEFAULT_CONFIG_FILE, VERSION};

#[test]
fn test_constants() {
    assert_eq!(APP_NAME, "vigil");
    assert_eq!(DEFAULT_CONFIG_FILE, "vigil.toml");
    assert!(!VERSION.is_empty());
}
