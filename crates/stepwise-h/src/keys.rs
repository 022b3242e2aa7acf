//! Key chord parsing for CDP `Input.dispatchKeyEvent`.

/// CDP modifier bit flags.
const ALT: i64 = 1;
const CTRL: i64 = 2;
const META: i64 = 4;
const SHIFT: i64 = 8;

/// One key press with its modifiers, ready to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChord {
    pub modifiers: i64,
    pub key: String,
    pub code: String,
    pub virtual_key: i64,
    /// Text inserted by the key, if it produces any.
    pub text: Option<String>,
}

impl KeyChord {
    /// Parse `Enter`, `a`, `Control+A` or `Shift+Tab`. Unknown named keys
    /// are passed through with no virtual key code.
    pub fn parse(chord: &str) -> Self {
        let parts: Vec<&str> = chord.split('+').map(str::trim).collect();
        let (key, mods) = match parts.split_last() {
            // A trailing "+" means the plus key itself.
            Some((&"", rest)) if !rest.is_empty() => ("+", &rest[..rest.len() - 1]),
            Some((key, rest)) => (*key, rest),
            None => ("", &[][..]),
        };

        let mut modifiers = 0;
        for m in mods {
            match m.to_lowercase().as_str() {
                "alt" | "option" => modifiers |= ALT,
                "ctrl" | "control" => modifiers |= CTRL,
                "meta" | "cmd" | "command" => modifiers |= META,
                "shift" => modifiers |= SHIFT,
                _ => {}
            }
        }
        Self::for_key(key, modifiers)
    }

    /// A single printable character typed without modifiers.
    pub fn character(c: char) -> Self {
        Self::for_key(&c.to_string(), 0)
    }

    fn for_key(key: &str, modifiers: i64) -> Self {
        if let Some((name, code, vk, text)) = named(key) {
            return Self {
                modifiers,
                key: name.to_string(),
                code: code.to_string(),
                virtual_key: vk,
                text: text.map(str::to_string),
            };
        }

        let mut chars = key.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                let upper = c.to_ascii_uppercase();
                let code = if upper.is_ascii_alphabetic() {
                    format!("Key{}", upper)
                } else if c.is_ascii_digit() {
                    format!("Digit{}", c)
                } else {
                    String::new()
                };
                let virtual_key = if upper.is_ascii_alphanumeric() { upper as i64 } else { 0 };
                // Shortcuts like Control+A do not insert text.
                let produces_text = modifiers & (CTRL | META | ALT) == 0;
                let key = match (c.is_ascii_alphabetic() && modifiers != 0, modifiers & SHIFT != 0) {
                    (true, true) => upper.to_string(),
                    (true, false) => c.to_ascii_lowercase().to_string(),
                    _ => c.to_string(),
                };
                Self {
                    modifiers,
                    text: produces_text.then(|| key.clone()),
                    key,
                    code,
                    virtual_key,
                }
            }
            _ => Self {
                modifiers,
                key: key.to_string(),
                code: key.to_string(),
                virtual_key: 0,
                text: None,
            },
        }
    }
}

fn named(key: &str) -> Option<(&'static str, &'static str, i64, Option<&'static str>)> {
    let entry = match key.to_lowercase().as_str() {
        "enter" | "return" => ("Enter", "Enter", 13, Some("\r")),
        "tab" => ("Tab", "Tab", 9, None),
        "escape" | "esc" => ("Escape", "Escape", 27, None),
        "backspace" => ("Backspace", "Backspace", 8, None),
        "delete" | "del" => ("Delete", "Delete", 46, None),
        "space" | " " => (" ", "Space", 32, Some(" ")),
        "arrowdown" | "down" => ("ArrowDown", "ArrowDown", 40, None),
        "arrowup" | "up" => ("ArrowUp", "ArrowUp", 38, None),
        "arrowleft" | "left" => ("ArrowLeft", "ArrowLeft", 37, None),
        "arrowright" | "right" => ("ArrowRight", "ArrowRight", 39, None),
        "home" => ("Home", "Home", 36, None),
        "end" => ("End", "End", 35, None),
        "pageup" => ("PageUp", "PageUp", 33, None),
        "pagedown" => ("PageDown", "PageDown", 34, None),
        _ => return None,
    };
    Some(entry)
}
