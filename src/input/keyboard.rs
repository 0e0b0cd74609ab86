//! Keyboard decoding
//!
//! Raw key codes become symbolic names through a [`KeyDecoder`]. The
//! production decoder is [`XkbKeyboard`]; the keymap and its state are built
//! together and swapped as one value when the compositor sends a new keymap.

use super::{KeyAction, KeyCallback};
use crate::config::KeyboardConfig;
use crate::error::{EngineError, Result};
use log::{debug, trace, warn};
use std::fmt;
use xkbcommon::xkb;

/// Offset between evdev key codes and XKB key codes
const EVDEV_OFFSET: u32 = 8;

/// Modifier masks as delivered by `wl_keyboard.modifiers`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierMasks {
    pub depressed: u32,
    pub latched: u32,
    pub locked: u32,
    pub group: u32,
}

/// Effective modifier state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub caps_lock: bool,
    pub logo: bool,
}

/// Layout-aware key decoding
pub trait KeyDecoder {
    /// Symbolic name for an evdev key code, e.g. "a", "Return", "Shift_L"
    fn key_name(&self, key: u32) -> String;

    /// Feed a modifier update into the decode state
    fn update_modifiers(&mut self, masks: ModifierMasks);

    /// Currently effective modifiers
    fn modifiers(&self) -> Modifiers;
}

impl fmt::Debug for dyn KeyDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDecoder")
            .field("modifiers", &self.modifiers())
            .finish()
    }
}

/// Keyboard notifications relevant to decoding
#[derive(Debug)]
pub enum KeyboardEvent {
    /// A freshly compiled keymap replacing the current one
    Keymap(Box<dyn KeyDecoder>),
    /// Focus gained with these keys already held down
    Enter { keys: Vec<u32> },
    Leave,
    Key { key: u32, action: KeyAction },
    Modifiers(ModifierMasks),
    RepeatInfo { rate: i32, delay: i32 },
}

/// xkbcommon keymap and state, always replaced together
pub struct XkbKeyboard {
    state: xkb::State,
    _keymap: xkb::Keymap,
}

impl XkbKeyboard {
    /// Compile a keymap from its text form (as sent by the compositor)
    pub fn from_string(context: &xkb::Context, text: String) -> Result<Self> {
        let keymap = xkb::Keymap::new_from_string(
            context,
            text,
            xkb::KEYMAP_FORMAT_TEXT_V1,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| EngineError::Keymap("xkbcommon could not compile keymap text".into()))?;
        Ok(Self::with_keymap(keymap))
    }

    /// Compile a keymap from RMLVO names
    pub fn from_names(context: &xkb::Context, config: &KeyboardConfig) -> Result<Self> {
        let keymap = xkb::Keymap::new_from_names(
            context,
            &config.rules,
            &config.model,
            &config.layout,
            &config.variant,
            config.options.clone(),
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| {
            EngineError::Keymap(format!(
                "no keymap for layout {:?} variant {:?}",
                config.layout, config.variant
            ))
        })?;
        Ok(Self::with_keymap(keymap))
    }

    fn with_keymap(keymap: xkb::Keymap) -> Self {
        let state = xkb::State::new(&keymap);
        Self {
            state,
            _keymap: keymap,
        }
    }
}

impl KeyDecoder for XkbKeyboard {
    fn key_name(&self, key: u32) -> String {
        let sym = self.state.key_get_one_sym((key + EVDEV_OFFSET).into());
        xkb::keysym_get_name(sym)
    }

    fn update_modifiers(&mut self, masks: ModifierMasks) {
        self.state
            .update_mask(masks.depressed, masks.latched, masks.locked, 0, 0, masks.group);
    }

    fn modifiers(&self) -> Modifiers {
        let active = |name: &str| self.state.mod_name_is_active(name, xkb::STATE_MODS_EFFECTIVE);
        Modifiers {
            shift: active(xkb::MOD_NAME_SHIFT),
            ctrl: active(xkb::MOD_NAME_CTRL),
            alt: active(xkb::MOD_NAME_ALT),
            caps_lock: active(xkb::MOD_NAME_CAPS),
            logo: active(xkb::MOD_NAME_LOGO),
        }
    }
}

/// Decode context owned by one window
#[derive(Debug, Default)]
pub struct KeyboardState {
    decoder: Option<Box<dyn KeyDecoder>>,
    focused: bool,
    repeat: Option<(i32, i32)>,
}

impl KeyboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_keymap(&self) -> bool {
        self.decoder.is_some()
    }

    pub fn has_focus(&self) -> bool {
        self.focused
    }

    /// Compositor repeat rate and delay, if announced
    pub fn repeat_info(&self) -> Option<(i32, i32)> {
        self.repeat
    }

    pub fn modifiers(&self) -> Modifiers {
        self.decoder
            .as_ref()
            .map(|d| d.modifiers())
            .unwrap_or_default()
    }

    /// Install a new decoder and return the previous one.
    ///
    /// The old keymap/state pair stays alive until the caller drops the
    /// returned value, after the swap.
    pub fn replace_keymap(&mut self, decoder: Box<dyn KeyDecoder>) -> Option<Box<dyn KeyDecoder>> {
        self.decoder.replace(decoder)
    }

    /// Apply one keyboard notification, invoking `callback` for key actions
    pub fn handle(&mut self, event: KeyboardEvent, mut callback: Option<&mut KeyCallback>) {
        match event {
            KeyboardEvent::Keymap(decoder) => {
                let previous = self.replace_keymap(decoder);
                debug!("Keymap replaced (had previous: {})", previous.is_some());
                drop(previous);
            }
            KeyboardEvent::Enter { keys } => {
                self.focused = true;
                debug!("Keyboard focus gained with {} keys held", keys.len());
                for key in keys {
                    self.emit(key, KeyAction::Pressed, callback.as_deref_mut());
                }
            }
            KeyboardEvent::Leave => {
                self.focused = false;
                debug!("Keyboard focus lost");
            }
            KeyboardEvent::Key { key, action } => {
                self.emit(key, action, callback.as_deref_mut());
            }
            KeyboardEvent::Modifiers(masks) => match self.decoder.as_mut() {
                Some(decoder) => decoder.update_modifiers(masks),
                None => trace!("Modifiers before keymap ignored: {:?}", masks),
            },
            KeyboardEvent::RepeatInfo { rate, delay } => {
                self.repeat = Some((rate, delay));
            }
        }
    }

    fn emit(&self, key: u32, action: KeyAction, callback: Option<&mut KeyCallback>) {
        let Some(decoder) = self.decoder.as_ref() else {
            warn!("Key {} arrived before any keymap; dropped", key);
            return;
        };
        let name = decoder.key_name(key);
        trace!("Key {} -> {} {:?}", key, name, action);
        if let Some(cb) = callback {
            cb(&name, action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    /// Decoder with a fixed table; shift upper-cases letters
    struct TableDecoder {
        names: HashMap<u32, &'static str>,
        shift: bool,
    }

    impl TableDecoder {
        fn boxed() -> Box<dyn KeyDecoder> {
            let names = HashMap::from([(30, "a"), (48, "b"), (28, "Return"), (42, "Shift_L")]);
            Box::new(Self {
                names,
                shift: false,
            })
        }
    }

    impl KeyDecoder for TableDecoder {
        fn key_name(&self, key: u32) -> String {
            let name = self.names.get(&key).copied().unwrap_or("NoSymbol");
            if self.shift && name.len() == 1 {
                name.to_uppercase()
            } else {
                name.to_string()
            }
        }

        fn update_modifiers(&mut self, masks: ModifierMasks) {
            self.shift = masks.depressed & 1 != 0;
        }

        fn modifiers(&self) -> Modifiers {
            Modifiers {
                shift: self.shift,
                ..Modifiers::default()
            }
        }
    }

    type Log = Rc<RefCell<Vec<(String, KeyAction)>>>;

    fn recorder() -> (Log, KeyCallback) {
        let log: Log = Rc::default();
        let sink = log.clone();
        let cb: KeyCallback = Box::new(move |name: &str, action| {
            sink.borrow_mut().push((name.to_string(), action));
        });
        (log, cb)
    }

    #[test]
    fn test_enter_reports_held_keys_as_presses() {
        let mut state = KeyboardState::new();
        let (log, mut cb) = recorder();
        state.handle(KeyboardEvent::Keymap(TableDecoder::boxed()), Some(&mut cb));
        state.handle(KeyboardEvent::Enter { keys: vec![30, 48] }, Some(&mut cb));

        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|(_, a)| *a == KeyAction::Pressed));
        assert_eq!(log[0].0, "a");
        assert_eq!(log[1].0, "b");
        assert!(state.has_focus());
    }

    #[test]
    fn test_key_press_and_release() {
        let mut state = KeyboardState::new();
        let (log, mut cb) = recorder();
        state.handle(KeyboardEvent::Keymap(TableDecoder::boxed()), Some(&mut cb));
        state.handle(
            KeyboardEvent::Key {
                key: 28,
                action: KeyAction::Pressed,
            },
            Some(&mut cb),
        );
        state.handle(
            KeyboardEvent::Key {
                key: 28,
                action: KeyAction::Released,
            },
            Some(&mut cb),
        );

        assert_eq!(
            *log.borrow(),
            vec![
                ("Return".to_string(), KeyAction::Pressed),
                ("Return".to_string(), KeyAction::Released)
            ]
        );
    }

    #[test]
    fn test_modifiers_never_invoke_callback() {
        let mut state = KeyboardState::new();
        let (log, mut cb) = recorder();
        state.handle(KeyboardEvent::Keymap(TableDecoder::boxed()), Some(&mut cb));
        state.handle(
            KeyboardEvent::Modifiers(ModifierMasks {
                depressed: 1,
                ..Default::default()
            }),
            Some(&mut cb),
        );

        assert!(log.borrow().is_empty());
        assert!(state.modifiers().shift);

        state.handle(
            KeyboardEvent::Key {
                key: 30,
                action: KeyAction::Pressed,
            },
            Some(&mut cb),
        );
        assert_eq!(log.borrow()[0].0, "A");
    }

    #[test]
    fn test_keymap_replacement_swaps_state_with_map() {
        let mut state = KeyboardState::new();
        state.handle(KeyboardEvent::Keymap(TableDecoder::boxed()), None);
        state.handle(
            KeyboardEvent::Modifiers(ModifierMasks {
                depressed: 1,
                ..Default::default()
            }),
            None,
        );
        assert!(state.modifiers().shift);

        // New keymap comes with a fresh state: shift is no longer latched in
        let old = state.replace_keymap(TableDecoder::boxed());
        assert!(old.is_some());
        assert!(!state.modifiers().shift);
    }

    #[test]
    fn test_keys_before_keymap_are_dropped() {
        let mut state = KeyboardState::new();
        let (log, mut cb) = recorder();
        state.handle(KeyboardEvent::Enter { keys: vec![30] }, Some(&mut cb));
        state.handle(
            KeyboardEvent::Key {
                key: 30,
                action: KeyAction::Pressed,
            },
            Some(&mut cb),
        );
        assert!(log.borrow().is_empty());
        assert!(!state.has_keymap());
    }

    #[test]
    fn test_leave_and_repeat_info() {
        let mut state = KeyboardState::new();
        state.handle(KeyboardEvent::Enter { keys: vec![] }, None);
        state.handle(KeyboardEvent::RepeatInfo { rate: 25, delay: 600 }, None);
        state.handle(KeyboardEvent::Leave, None);
        assert!(!state.has_focus());
        assert_eq!(state.repeat_info(), Some((25, 600)));
    }

    fn us_keyboard(context: &xkb::Context) -> XkbKeyboard {
        XkbKeyboard::from_names(context, &KeyboardConfig::default()).expect("us keymap")
    }

    fn shift_mask(keyboard: &XkbKeyboard) -> u32 {
        1 << keyboard._keymap.mod_get_index(xkb::MOD_NAME_SHIFT)
    }

    #[test]
    fn test_xkb_decodes_evdev_codes() {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let keyboard = us_keyboard(&context);

        assert_eq!(keyboard.key_name(30), "a");
        assert_eq!(keyboard.key_name(28), "Return");
        assert_eq!(keyboard.key_name(1), "Escape");
        assert_eq!(keyboard.modifiers(), Modifiers::default());
    }

    #[test]
    fn test_xkb_shift_changes_symbol() {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let mut keyboard = us_keyboard(&context);
        let shift = shift_mask(&keyboard);

        keyboard.update_modifiers(ModifierMasks {
            depressed: shift,
            ..ModifierMasks::default()
        });
        assert_eq!(keyboard.key_name(30), "A");
        assert!(keyboard.modifiers().shift);
        assert!(!keyboard.modifiers().ctrl);

        keyboard.update_modifiers(ModifierMasks::default());
        assert_eq!(keyboard.key_name(30), "a");
        assert!(!keyboard.modifiers().shift);
    }

    #[test]
    fn test_xkb_keymap_text_compiles() {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let text = us_keyboard(&context)
            ._keymap
            .get_as_string(xkb::KEYMAP_FORMAT_TEXT_V1);

        let keyboard = XkbKeyboard::from_string(&context, text).unwrap();
        assert_eq!(keyboard.key_name(30), "a");

        assert!(matches!(
            XkbKeyboard::from_string(&context, "not a keymap".to_string()),
            Err(EngineError::Keymap(_))
        ));
    }

    #[test]
    fn test_xkb_keymap_replacement_resets_modifiers() {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let mut state = KeyboardState::new();
        let (log, mut cb) = recorder();

        let keyboard = us_keyboard(&context);
        let shift = shift_mask(&keyboard);
        state.handle(KeyboardEvent::Keymap(Box::new(keyboard)), Some(&mut cb));
        state.handle(
            KeyboardEvent::Modifiers(ModifierMasks {
                depressed: shift,
                ..ModifierMasks::default()
            }),
            Some(&mut cb),
        );
        state.handle(
            KeyboardEvent::Key {
                key: 30,
                action: KeyAction::Pressed,
            },
            Some(&mut cb),
        );
        assert!(state.modifiers().shift);

        state.handle(
            KeyboardEvent::Keymap(Box::new(us_keyboard(&context))),
            Some(&mut cb),
        );
        assert!(!state.modifiers().shift);
        state.handle(
            KeyboardEvent::Key {
                key: 30,
                action: KeyAction::Released,
            },
            Some(&mut cb),
        );

        assert_eq!(
            *log.borrow(),
            vec![
                ("A".to_string(), KeyAction::Pressed),
                ("a".to_string(), KeyAction::Released),
            ]
        );
    }
}
