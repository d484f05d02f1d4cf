//! Key specifications such as `"Enter"` or `"Shift+Enter"`, translated into
//! the fields `Input.dispatchKeyEvent` expects.

/// CDP modifier bit flags.
pub const MOD_ALT: i32 = 1;
pub const MOD_CTRL: i32 = 2;
pub const MOD_META: i32 = 4;
pub const MOD_SHIFT: i32 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    pub key: String,
    pub code: String,
    pub modifiers: i32,
    pub key_code: Option<i32>,
}

impl KeySpec {
    /// Parse a key specification like "Enter", "Tab", "Ctrl+A", "Shift+Enter".
    pub fn parse(spec: &str) -> Self {
        let parts: Vec<&str> = spec.split('+').collect();
        let mut modifiers = 0i32;
        let mut main_key = spec.to_string();

        if parts.len() > 1 {
            for &part in &parts[..parts.len() - 1] {
                match part.to_lowercase().as_str() {
                    "ctrl" | "control" => modifiers |= MOD_CTRL,
                    "alt" | "option" => modifiers |= MOD_ALT,
                    "shift" => modifiers |= MOD_SHIFT,
                    "meta" | "cmd" | "command" => modifiers |= MOD_META,
                    _ => {}
                }
            }
            main_key = parts.last().unwrap_or(&spec).to_string();
        }

        let (key, code, key_code) = match main_key.as_str() {
            "Enter" | "Return" => ("Enter", "Enter", Some(13)),
            "Tab" => ("Tab", "Tab", Some(9)),
            "Escape" | "Esc" => ("Escape", "Escape", Some(27)),
            "Backspace" => ("Backspace", "Backspace", Some(8)),
            "Delete" => ("Delete", "Delete", Some(46)),
            "ArrowUp" | "Up" => ("ArrowUp", "ArrowUp", Some(38)),
            "ArrowDown" | "Down" => ("ArrowDown", "ArrowDown", Some(40)),
            "Space" | " " => (" ", "Space", Some(32)),
            _ => {
                let mut chars = main_key.chars();
                if let (Some(c), None) = (chars.next(), chars.next()) {
                    let upper = c.to_ascii_uppercase();
                    let key_code = upper.is_ascii_alphanumeric().then_some(upper as i32);
                    let code = if c.is_ascii_digit() {
                        format!("Digit{}", c)
                    } else {
                        format!("Key{}", upper)
                    };
                    return Self {
                        key: main_key,
                        code,
                        modifiers,
                        key_code,
                    };
                }
                return Self {
                    code: main_key.clone(),
                    key: main_key,
                    modifiers,
                    key_code: None,
                };
            }
        };

        Self {
            key: key.to_string(),
            code: code.to_string(),
            modifiers,
            key_code,
        }
    }

    /// Text the key produces on keyDown, if any. Chords with anything other
    /// than Shift produce none. Shift+Enter still carries `"\r"`: without it
    /// the page gets no input event and no line break.
    pub fn text(&self) -> Option<String> {
        if self.modifiers & !MOD_SHIFT != 0 {
            return None;
        }
        match self.key.as_str() {
            "Enter" => Some("\r".to_string()),
            " " => Some(" ".to_string()),
            k if k.chars().count() == 1 => Some(k.to_string()),
            _ => None,
        }
    }
}
