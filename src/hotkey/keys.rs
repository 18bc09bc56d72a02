//! Symbolic key table.
//!
//! Key names follow the ones written into `Hotkeys.xml` by earlier releases
//! (`F1`, `D1`, `NumPad3`, `OemMinus`, ...), so existing files keep loading.
//! Each key carries its Win32 virtual-key code.

macro_rules! key_table {
    ($($variant:ident = $vk:literal),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub enum Key {
            /// No key captured yet.
            #[default]
            None,
            $($variant),*
        }

        impl Key {
            pub const ALL: &'static [Key] = &[$(Key::$variant),*];

            /// Name as stored on disk.
            pub fn name(self) -> &'static str {
                match self {
                    Key::None => "None",
                    $(Key::$variant => stringify!($variant)),*
                }
            }

            /// Win32 virtual-key code.
            pub fn vk(self) -> u32 {
                match self {
                    Key::None => 0,
                    $(Key::$variant => $vk),*
                }
            }
        }
    };
}

key_table! {
    Back = 0x08,
    Tab = 0x09,
    Return = 0x0D,
    Pause = 0x13,
    CapsLock = 0x14,
    Escape = 0x1B,
    Space = 0x20,
    PageUp = 0x21,
    PageDown = 0x22,
    End = 0x23,
    Home = 0x24,
    Left = 0x25,
    Up = 0x26,
    Right = 0x27,
    Down = 0x28,
    PrintScreen = 0x2C,
    Insert = 0x2D,
    Delete = 0x2E,
    D0 = 0x30,
    D1 = 0x31,
    D2 = 0x32,
    D3 = 0x33,
    D4 = 0x34,
    D5 = 0x35,
    D6 = 0x36,
    D7 = 0x37,
    D8 = 0x38,
    D9 = 0x39,
    A = 0x41,
    B = 0x42,
    C = 0x43,
    D = 0x44,
    E = 0x45,
    F = 0x46,
    G = 0x47,
    H = 0x48,
    I = 0x49,
    J = 0x4A,
    K = 0x4B,
    L = 0x4C,
    M = 0x4D,
    N = 0x4E,
    O = 0x4F,
    P = 0x50,
    Q = 0x51,
    R = 0x52,
    S = 0x53,
    T = 0x54,
    U = 0x55,
    V = 0x56,
    W = 0x57,
    X = 0x58,
    Y = 0x59,
    Z = 0x5A,
    LWin = 0x5B,
    RWin = 0x5C,
    Apps = 0x5D,
    Sleep = 0x5F,
    NumPad0 = 0x60,
    NumPad1 = 0x61,
    NumPad2 = 0x62,
    NumPad3 = 0x63,
    NumPad4 = 0x64,
    NumPad5 = 0x65,
    NumPad6 = 0x66,
    NumPad7 = 0x67,
    NumPad8 = 0x68,
    NumPad9 = 0x69,
    Multiply = 0x6A,
    Add = 0x6B,
    Separator = 0x6C,
    Subtract = 0x6D,
    Decimal = 0x6E,
    Divide = 0x6F,
    F1 = 0x70,
    F2 = 0x71,
    F3 = 0x72,
    F4 = 0x73,
    F5 = 0x74,
    F6 = 0x75,
    F7 = 0x76,
    F8 = 0x77,
    F9 = 0x78,
    F10 = 0x79,
    F11 = 0x7A,
    F12 = 0x7B,
    F13 = 0x7C,
    F14 = 0x7D,
    F15 = 0x7E,
    F16 = 0x7F,
    F17 = 0x80,
    F18 = 0x81,
    F19 = 0x82,
    F20 = 0x83,
    F21 = 0x84,
    F22 = 0x85,
    F23 = 0x86,
    F24 = 0x87,
    NumLock = 0x90,
    Scroll = 0x91,
    LShiftKey = 0xA0,
    RShiftKey = 0xA1,
    LControlKey = 0xA2,
    RControlKey = 0xA3,
    LMenu = 0xA4,
    RMenu = 0xA5,
    BrowserBack = 0xA6,
    BrowserForward = 0xA7,
    BrowserRefresh = 0xA8,
    BrowserStop = 0xA9,
    BrowserSearch = 0xAA,
    BrowserFavorites = 0xAB,
    BrowserHome = 0xAC,
    VolumeMute = 0xAD,
    VolumeDown = 0xAE,
    VolumeUp = 0xAF,
    MediaNextTrack = 0xB0,
    MediaPreviousTrack = 0xB1,
    MediaStop = 0xB2,
    MediaPlayPause = 0xB3,
    LaunchMail = 0xB4,
    SelectMedia = 0xB5,
    LaunchApplication1 = 0xB6,
    LaunchApplication2 = 0xB7,
    OemSemicolon = 0xBA,
    Oemplus = 0xBB,
    Oemcomma = 0xBC,
    OemMinus = 0xBD,
    OemPeriod = 0xBE,
    OemQuestion = 0xBF,
    Oemtilde = 0xC0,
    OemOpenBrackets = 0xDB,
    OemPipe = 0xDC,
    OemCloseBrackets = 0xDD,
    OemQuotes = 0xDE,
    Oem8 = 0xDF,
    OemBackslash = 0xE2,
    ProcessKey = 0xE5,
    Packet = 0xE7,
    Attn = 0xF6,
    Crsel = 0xF7,
    Exsel = 0xF8,
    EraseEof = 0xF9,
    Play = 0xFA,
    Zoom = 0xFB,
    NoName = 0xFC,
    Pa1 = 0xFD,
    OemClear = 0xFE,
}

impl Key {
    /// Look a key up by its stored name, its display name or a common
    /// alias, ignoring case.
    pub fn from_name(name: &str) -> Option<Key> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("none") {
            return Some(Key::None);
        }

        let exact = |wanted: &str| {
            Key::ALL
                .iter()
                .copied()
                .find(|k| k.name().eq_ignore_ascii_case(wanted))
        };

        exact(name)
            .or_else(|| alias(&name.to_ascii_lowercase()))
            .or_else(|| exact(&format!("Oem{name}")))
    }

    pub fn is_none(self) -> bool {
        self == Key::None
    }

    /// Name shown to the user: digits lose their `D` prefix and named OEM
    /// keys lose their `Oem` prefix (`Oem8` stays as is).
    pub fn display_name(self) -> &'static str {
        let name = self.name();
        if let Some(digit) = name.strip_prefix('D')
            && digit.len() == 1
            && digit.as_bytes()[0].is_ascii_digit()
        {
            return digit;
        }
        match name.strip_prefix("Oem") {
            Some(rest) if rest.starts_with(|c: char| c.is_ascii_alphabetic()) => rest,
            _ => name,
        }
    }
}

fn alias(lower: &str) -> Option<Key> {
    let key = match lower {
        "enter" => Key::Return,
        "backspace" => Key::Back,
        "esc" => Key::Escape,
        "prior" | "pgup" => Key::PageUp,
        "next" | "pgdn" => Key::PageDown,
        "ins" => Key::Insert,
        "del" => Key::Delete,
        "oem1" => Key::OemSemicolon,
        "oem2" => Key::OemQuestion,
        "oem3" => Key::Oemtilde,
        "oem4" => Key::OemOpenBrackets,
        "oem5" => Key::OemPipe,
        "oem6" => Key::OemCloseBrackets,
        "oem7" => Key::OemQuotes,
        "oem102" => Key::OemBackslash,
        "snapshot" => Key::PrintScreen,
        "capital" => Key::CapsLock,
        "scrolllock" => Key::Scroll,
        "plus" => Key::Oemplus,
        "minus" => Key::OemMinus,
        "comma" => Key::Oemcomma,
        "period" => Key::OemPeriod,
        "0" => Key::D0,
        "1" => Key::D1,
        "2" => Key::D2,
        "3" => Key::D3,
        "4" => Key::D4,
        "5" => Key::D5,
        "6" => Key::D6,
        "7" => Key::D7,
        "8" => Key::D8,
        "9" => Key::D9,
        _ => return None,
    };
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_is_case_insensitive() {
        assert_eq!(Key::from_name("F1"), Some(Key::F1));
        assert_eq!(Key::from_name("f1"), Some(Key::F1));
        assert_eq!(Key::from_name("numpad3"), Some(Key::NumPad3));
        assert_eq!(Key::from_name("Bogus"), None);
    }

    #[test]
    fn test_aliases() {
        assert_eq!(Key::from_name("Enter"), Some(Key::Return));
        assert_eq!(Key::from_name("Next"), Some(Key::PageDown));
        assert_eq!(Key::from_name("7"), Some(Key::D7));
        assert_eq!(Key::from_name("None"), Some(Key::None));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(Key::D5.display_name(), "5");
        assert_eq!(Key::D.display_name(), "D");
        assert_eq!(Key::OemMinus.display_name(), "Minus");
        assert_eq!(Key::F12.display_name(), "F12");
    }

    #[test]
    fn test_legacy_names_and_duplicates() {
        assert_eq!(Key::from_name("Apps"), Some(Key::Apps));
        assert_eq!(Key::from_name("NumLock"), Some(Key::NumLock));
        assert_eq!(Key::from_name("BrowserBack"), Some(Key::BrowserBack));
        assert_eq!(Key::from_name("LaunchApplication2"), Some(Key::LaunchApplication2));
        assert_eq!(Key::from_name("Oem8"), Some(Key::Oem8));
        assert_eq!(Key::from_name("Oem102"), Some(Key::OemBackslash));
        assert_eq!(Key::from_name("Snapshot"), Some(Key::PrintScreen));
        assert_eq!(Key::from_name("Capital"), Some(Key::CapsLock));
    }

    #[test]
    fn test_display_name_parses_back() {
        for &key in Key::ALL {
            assert_eq!(Key::from_name(key.display_name()), Some(key), "{key:?}");
        }
        assert_eq!(Key::Oem8.display_name(), "Oem8");
        assert_eq!(Key::OemBackslash.display_name(), "Backslash");
    }

    #[test]
    fn test_names_are_unique() {
        for (i, a) in Key::ALL.iter().enumerate() {
            for b in &Key::ALL[i + 1..] {
                assert_ne!(a.name(), b.name());
                assert_ne!(a.vk(), b.vk());
            }
        }
    }
}
