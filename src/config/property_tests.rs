//! Property-based tests for configuration module
//!
//! Generated configurations must validate exactly when their fields are in
//! range, and must survive a TOML round-trip unchanged.

use super::*;
use proptest::prelude::*;

prop_compose! {
    fn valid_shm_config()(
        name in "/[a-z][a-z0-9_-]{0,30}",
        max_attempts in 1u32..=10_000u32,
    ) -> ShmConfig {
        ShmConfig {
            name_prefix: name,
            max_attempts,
        }
    }
}

prop_compose! {
    fn valid_keyboard_config()(
        fallback_keymap in any::<bool>(),
        layout in "[a-z]{2,3}",
        variant in prop_oneof![Just(String::new()), Just("dvorak".to_string()), Just("nodeadkeys".to_string())],
        options in proptest::option::of("[a-z]+:[a-z_]+"),
    ) -> KeyboardConfig {
        KeyboardConfig {
            fallback_keymap,
            rules: String::new(),
            model: String::new(),
            layout,
            variant,
            options,
        }
    }
}

prop_compose! {
    fn valid_engine_config()(
        shm in valid_shm_config(),
        keyboard in valid_keyboard_config(),
        app_id in proptest::option::of("[a-z]+\\.[a-z]+\\.[a-z]+"),
        debug in any::<bool>(),
    ) -> EngineConfig {
        EngineConfig {
            shm,
            window: WindowConfig { app_id },
            keyboard,
            general: GeneralConfig { debug },
        }
    }
}

proptest! {
    #[test]
    fn prop_valid_configs_validate(config in valid_engine_config()) {
        prop_assert!(config.validate().is_ok());
    }

    #[test]
    fn prop_toml_roundtrip_is_lossless(config in valid_engine_config()) {
        let text = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&text).unwrap();
        prop_assert_eq!(parsed, config);
    }

    #[test]
    fn prop_out_of_range_attempts_rejected(attempts in 10_001u32..u32::MAX) {
        let mut config = EngineConfig::default();
        config.shm.max_attempts = attempts;
        prop_assert!(config.validate().is_err());
    }

    #[test]
    fn prop_nested_prefix_rejected(head in "[a-z]{1,8}", tail in "[a-z]{1,8}") {
        let mut config = EngineConfig::default();
        config.shm.name_prefix = format!("/{head}/{tail}");
        prop_assert!(config.validate().is_err());
    }
}
