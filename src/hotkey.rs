//! Global hotkeys.
//!
//! A trigger key starts typing and a fixed cancel key stops it. Rebinding
//! always unregisters everything first, so no stale binding survives.

use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, TypeAssistError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    /// Start typing if idle.
    Trigger,
    /// Request cancellation if typing.
    Cancel,
}

/// OS-level registration of global hotkeys.
pub trait HotkeyRegistrar {
    fn register(&mut self, hotkey: HotKey) -> std::result::Result<(), String>;
    fn unregister(&mut self, hotkey: HotKey) -> std::result::Result<(), String>;
}

impl HotkeyRegistrar for GlobalHotKeyManager {
    fn register(&mut self, hotkey: HotKey) -> std::result::Result<(), String> {
        GlobalHotKeyManager::register(self, hotkey).map_err(|e| e.to_string())
    }

    fn unregister(&mut self, hotkey: HotKey) -> std::result::Result<(), String> {
        GlobalHotKeyManager::unregister(self, hotkey).map_err(|e| e.to_string())
    }
}

type Bindings = Arc<Mutex<HashMap<u32, (HotKey, HotkeyAction)>>>;

/// Owns the trigger binding and, unless the trigger is the cancel key
/// itself, the cancel binding.
pub struct HotkeyManager<R = GlobalHotKeyManager> {
    registrar: R,
    bindings: Bindings,
    cancel_key: String,
    cancel_hotkey: HotKey,
    current: Option<String>,
}

impl HotkeyManager<GlobalHotKeyManager> {
    pub fn new(cancel_key: &str) -> Result<Self> {
        let manager = GlobalHotKeyManager::new()
            .map_err(|e| TypeAssistError::hotkey(format!("failed to create hotkey manager: {}", e)))?;
        Self::with_registrar(manager, cancel_key)
    }
}

impl<R: HotkeyRegistrar> HotkeyManager<R> {
    pub fn with_registrar(registrar: R, cancel_key: &str) -> Result<Self> {
        let cancel_hotkey = parse_hotkey(cancel_key)?;
        Ok(Self {
            registrar,
            bindings: Arc::new(Mutex::new(HashMap::new())),
            cancel_key: cancel_key.to_string(),
            cancel_hotkey,
            current: None,
        })
    }

    /// Replaces every binding with `key` as the trigger.
    ///
    /// On failure nothing is bound for the offending key, and the error names it.
    pub fn set_hotkey(&mut self, key: &str) -> Result<()> {
        let trigger = parse_hotkey(key)?;

        self.unregister_all();

        if let Err(reason) = self.registrar.register(trigger) {
            tracing::error!(key, %reason, "Failed to register trigger hotkey");
            return Err(TypeAssistError::hotkey_registration(key, reason));
        }
        self.insert(trigger, HotkeyAction::Trigger)?;
        self.current = Some(key.to_string());

        if trigger != self.cancel_hotkey {
            if let Err(reason) = self.registrar.register(self.cancel_hotkey) {
                tracing::error!(key = %self.cancel_key, %reason, "Failed to register cancel hotkey");
                return Err(TypeAssistError::hotkey_registration(&self.cancel_key, reason));
            }
            self.insert(self.cancel_hotkey, HotkeyAction::Cancel)?;
        }

        tracing::info!(key, cancel_key = %self.cancel_key, "Hotkey registered");
        Ok(())
    }

    pub fn current_hotkey(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn action_for(&self, id: u32) -> Option<HotkeyAction> {
        self.bindings
            .lock()
            .ok()
            .and_then(|bindings| bindings.get(&id).map(|(_, action)| *action))
    }

    pub fn active_bindings(&self) -> Vec<HotkeyAction> {
        self.bindings
            .lock()
            .map(|bindings| bindings.values().map(|(_, action)| *action).collect())
            .unwrap_or_default()
    }

    pub fn unregister_all(&mut self) {
        let drained: Vec<HotKey> = match self.bindings.lock() {
            Ok(mut bindings) => bindings.drain().map(|(_, (hotkey, _))| hotkey).collect(),
            Err(e) => {
                tracing::error!(error = %e, "Hotkey bindings lock poisoned");
                return;
            }
        };
        for hotkey in drained {
            if let Err(reason) = self.registrar.unregister(hotkey) {
                tracing::warn!(%reason, "Failed to unregister hotkey");
            }
        }
        self.current = None;
    }

    fn insert(&self, hotkey: HotKey, action: HotkeyAction) -> Result<()> {
        let mut bindings = self
            .bindings
            .lock()
            .map_err(|e| TypeAssistError::hotkey(format!("bindings lock poisoned: {}", e)))?;
        bindings.insert(hotkey.id(), (hotkey, action));
        Ok(())
    }

    /// Forwards pressed hotkeys as actions until `actions` is closed.
    pub fn start_listener(&self, actions: mpsc::UnboundedSender<HotkeyAction>) -> JoinHandle<()> {
        let receiver = GlobalHotKeyEvent::receiver();
        let bindings = Arc::clone(&self.bindings);

        tokio::task::spawn_blocking(move || loop {
            if actions.is_closed() {
                break;
            }

            if let Ok(event) = receiver.recv_timeout(Duration::from_millis(50)) {
                if event.state != HotKeyState::Pressed {
                    continue;
                }
                let action = bindings
                    .lock()
                    .ok()
                    .and_then(|b| b.get(&event.id).map(|(_, action)| *action));
                match action {
                    Some(action) => {
                        tracing::debug!(?action, "Hotkey pressed");
                        if actions.send(action).is_err() {
                            break;
                        }
                    }
                    None => tracing::trace!(id = event.id, "Ignoring unbound hotkey"),
                }
            }
        })
    }
}

/// Parses accelerators such as `F9`, `ctrl+shift+t` or `CommandOrControl+K`.
pub fn parse_hotkey(hotkey_str: &str) -> Result<HotKey> {
    let binding = hotkey_str.to_lowercase();
    let parts: Vec<&str> = binding.split('+').map(|s| s.trim()).collect();

    if parts.iter().all(|p| p.is_empty()) {
        return Err(TypeAssistError::invalid_hotkey(hotkey_str, "empty hotkey"));
    }

    let mut modifiers = Modifiers::empty();
    let mut key_code = None;

    for part in &parts {
        match *part {
            "ctrl" | "control" => modifiers |= Modifiers::CONTROL,
            "alt" | "option" => modifiers |= Modifiers::ALT,
            "shift" => modifiers |= Modifiers::SHIFT,
            "meta" | "cmd" | "command" | "super" => modifiers |= Modifiers::SUPER,
            "commandorcontrol" | "cmdorctrl" => {
                if cfg!(target_os = "macos") {
                    modifiers |= Modifiers::SUPER
                } else {
                    modifiers |= Modifiers::CONTROL
                }
            }
            "" => return Err(TypeAssistError::invalid_hotkey(hotkey_str, "empty key segment")),
            key => {
                if key_code.is_some() {
                    return Err(TypeAssistError::invalid_hotkey(
                        hotkey_str,
                        "multiple keys specified",
                    ));
                }
                key_code = Some(parse_key_code(key).ok_or_else(|| {
                    TypeAssistError::invalid_hotkey(hotkey_str, format!("unsupported key '{}'", key))
                })?);
            }
        }
    }

    let code = key_code.ok_or_else(|| TypeAssistError::invalid_hotkey(hotkey_str, "no key specified"))?;
    let modifiers = (!modifiers.is_empty()).then_some(modifiers);

    Ok(HotKey::new(modifiers, code))
}

fn parse_key_code(key: &str) -> Option<Code> {
    let code = match key {
        "a" => Code::KeyA,
        "b" => Code::KeyB,
        "c" => Code::KeyC,
        "d" => Code::KeyD,
        "e" => Code::KeyE,
        "f" => Code::KeyF,
        "g" => Code::KeyG,
        "h" => Code::KeyH,
        "i" => Code::KeyI,
        "j" => Code::KeyJ,
        "k" => Code::KeyK,
        "l" => Code::KeyL,
        "m" => Code::KeyM,
        "n" => Code::KeyN,
        "o" => Code::KeyO,
        "p" => Code::KeyP,
        "q" => Code::KeyQ,
        "r" => Code::KeyR,
        "s" => Code::KeyS,
        "t" => Code::KeyT,
        "u" => Code::KeyU,
        "v" => Code::KeyV,
        "w" => Code::KeyW,
        "x" => Code::KeyX,
        "y" => Code::KeyY,
        "z" => Code::KeyZ,

        "0" => Code::Digit0,
        "1" => Code::Digit1,
        "2" => Code::Digit2,
        "3" => Code::Digit3,
        "4" => Code::Digit4,
        "5" => Code::Digit5,
        "6" => Code::Digit6,
        "7" => Code::Digit7,
        "8" => Code::Digit8,
        "9" => Code::Digit9,

        "f1" => Code::F1,
        "f2" => Code::F2,
        "f3" => Code::F3,
        "f4" => Code::F4,
        "f5" => Code::F5,
        "f6" => Code::F6,
        "f7" => Code::F7,
        "f8" => Code::F8,
        "f9" => Code::F9,
        "f10" => Code::F10,
        "f11" => Code::F11,
        "f12" => Code::F12,
        "f13" => Code::F13,
        "f14" => Code::F14,
        "f15" => Code::F15,
        "f16" => Code::F16,
        "f17" => Code::F17,
        "f18" => Code::F18,
        "f19" => Code::F19,
        "f20" => Code::F20,
        "f21" => Code::F21,
        "f22" => Code::F22,
        "f23" => Code::F23,
        "f24" => Code::F24,

        "space" => Code::Space,
        "enter" | "return" => Code::Enter,
        "tab" => Code::Tab,
        "escape" | "esc" => Code::Escape,
        "backspace" => Code::Backspace,
        "delete" | "del" => Code::Delete,
        "insert" | "ins" => Code::Insert,
        "home" => Code::Home,
        "end" => Code::End,
        "pageup" => Code::PageUp,
        "pagedown" => Code::PageDown,
        "pause" => Code::Pause,
        "scrolllock" => Code::ScrollLock,

        "up" | "arrowup" => Code::ArrowUp,
        "down" | "arrowdown" => Code::ArrowDown,
        "left" | "arrowleft" => Code::ArrowLeft,
        "right" | "arrowright" => Code::ArrowRight,

        _ => return None,
    };

    Some(code)
}
