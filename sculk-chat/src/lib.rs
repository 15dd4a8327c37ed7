//!
//! Minecraft chat components.
//!
//! A chat message is a tree of [`ChatCompound`]s: five tri-state decorations, an optional color
//! reference, an optional insertion string, one content trait (plain text, a translation with
//! substitutions, a keybind, or a scoreboard reference), optional click and hover events, and an
//! ordered list of child components that inherit their parent's style.
//!
//! On the wire a chat message is a JSON object. The [`reader`] module rebuilds the tree from a
//! stream of JSON events through a pushdown automaton; [`read_chat_compound`] front-ends it with
//! a `serde_json` tokenizer over a length-bounded window. [`write_chat_compound`] emits the
//! canonical JSON form, which the reader round-trips.

///
/// The JSON event pushdown reader.
pub mod reader;

///
/// The canonical JSON writer.
pub mod writer;

pub use reader::{ChatReader, JsonEvent};

use sculk_protocol::CodecError;
use sculk_stream::{InputStream, OutputStream, StreamError};
use std::fmt::{Display, Formatter};

///
/// Type alias used for the result of chat operations.
pub type Result<T> = std::result::Result<T, ChatError>;

///
/// Error produced while reading or writing chat components.
#[derive(Debug)]
#[non_exhaustive]
pub enum ChatError {
    ///
    /// A codec-layer failure below the JSON level.
    Codec(CodecError),

    ///
    /// The JSON tokenizer rejected the input.
    Json(String),

    ///
    /// Two different content traits were given for the same component, such as `text` together
    /// with `translate`.
    AmbiguousTrait,

    ///
    /// A field that may appear at most once appeared again.
    Duplicate(&'static str),

    ///
    /// An unrecognized key was encountered in strict mode.
    UnexpectedKey(String),

    ///
    /// A value had the wrong type, or an otherwise invalid form, in strict mode.
    UnexpectedValue(&'static str),

    ///
    /// A length-limited field exceeded its cap.
    TooLong(&'static str),

    ///
    /// The event stream ended before the root object was closed.
    UnexpectedEnd,
}

impl Display for ChatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::Codec(codec) => Display::fmt(codec, f),
            ChatError::Json(message) => write!(f, "json error: {message}"),
            ChatError::AmbiguousTrait => f.write_str("ambiguous chat trait"),
            ChatError::Duplicate(field) => write!(f, "duplicate chat field: {field}"),
            ChatError::UnexpectedKey(key) => write!(f, "unexpected json key: {key}"),
            ChatError::UnexpectedValue(message) => write!(f, "unexpected json value: {message}"),
            ChatError::TooLong(field) => write!(f, "chat field too long: {field}"),
            ChatError::UnexpectedEnd => f.write_str("unexpected end of chat json"),
        }
    }
}

impl std::error::Error for ChatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChatError::Codec(codec) => Some(codec),
            _ => None,
        }
    }
}

impl From<CodecError> for ChatError {
    fn from(value: CodecError) -> Self {
        ChatError::Codec(value)
    }
}

impl From<StreamError> for ChatError {
    fn from(value: StreamError) -> Self {
        ChatError::Codec(value.into())
    }
}

///
/// A tri-state text decoration. Absent decorations inherit the parent's effective value.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Decoration {
    ///
    /// Not specified; the parent's effective value applies.
    #[default]
    Inherit,

    ///
    /// Explicitly enabled.
    Enabled,

    ///
    /// Explicitly disabled.
    Disabled,
}

impl Decoration {
    ///
    /// Resolves the tri-state against the parent's effective value.
    #[must_use]
    pub fn resolve(self, parent: bool) -> bool {
        match self {
            Decoration::Inherit => parent,
            Decoration::Enabled => true,
            Decoration::Disabled => false,
        }
    }
}

impl From<bool> for Decoration {
    fn from(value: bool) -> Self {
        if value {
            Decoration::Enabled
        } else {
            Decoration::Disabled
        }
    }
}

///
/// A named chat color. Components reference entries of the static color table; `reset` forces
/// the context's default color.
#[derive(Debug, Eq, PartialEq)]
pub struct ChatColor {
    ///
    /// The color's JSON name, such as `dark_purple`.
    pub name: &'static str,

    ///
    /// The legacy control character for the color.
    pub code: char,
}

///
/// The sixteen named colors, in control-character order.
pub static COLORS: [ChatColor; 16] = [
    ChatColor { name: "black", code: '0' },
    ChatColor { name: "dark_blue", code: '1' },
    ChatColor { name: "dark_green", code: '2' },
    ChatColor { name: "dark_aqua", code: '3' },
    ChatColor { name: "dark_red", code: '4' },
    ChatColor { name: "dark_purple", code: '5' },
    ChatColor { name: "gold", code: '6' },
    ChatColor { name: "gray", code: '7' },
    ChatColor { name: "dark_gray", code: '8' },
    ChatColor { name: "blue", code: '9' },
    ChatColor { name: "green", code: 'a' },
    ChatColor { name: "aqua", code: 'b' },
    ChatColor { name: "red", code: 'c' },
    ChatColor { name: "light_purple", code: 'd' },
    ChatColor { name: "yellow", code: 'e' },
    ChatColor { name: "white", code: 'f' },
];

///
/// The special `reset` color.
pub static RESET: ChatColor = ChatColor {
    name: "reset",
    code: 'r',
};

///
/// Resolves a color name against the table, including `reset`.
#[must_use]
pub fn lookup_color(name: &str) -> Option<&'static ChatColor> {
    if name == RESET.name {
        return Some(&RESET);
    }

    COLORS.iter().find(|color| color.name == name)
}

///
/// The content trait of a component. Traits are mutually exclusive.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatContent {
    ///
    /// Literal text.
    Text {
        ///
        /// The text shown directly.
        text: String,
    },

    ///
    /// A translation key with ordered substitutions.
    Translate {
        ///
        /// The translation key resolved against the client locale.
        key: String,

        ///
        /// Substitutions for the key's placeholders, in order.
        with: Vec<String>,
    },

    ///
    /// The client's binding for a named input.
    Keybind {
        ///
        /// The keybind identifier from the client options.
        key: String,
    },

    ///
    /// A scoreboard value.
    Score {
        ///
        /// The score holder's name.
        name: String,

        ///
        /// The objective, at most 16 UTF-16 code units.
        objective: String,

        ///
        /// The displayed value, if fixed by the sender.
        value: Option<String>,
    },
}

///
/// A click event attached to a component.
#[derive(Clone, Debug, PartialEq)]
pub enum ClickEvent {
    ///
    /// Opens a URL.
    OpenUrl(String),

    ///
    /// Runs a command as the clicking player.
    RunCommand(String),

    ///
    /// Fills the chat input with a command.
    SuggestCommand(String),

    ///
    /// Turns to a page of a written book.
    ChangePage(u64),
}

///
/// A hover event attached to a component.
#[derive(Clone, Debug, PartialEq)]
pub enum HoverEvent {
    ///
    /// Shows a tooltip text.
    ShowText(String),

    ///
    /// Shows a serialized item.
    ShowItem(String),

    ///
    /// Shows a serialized entity.
    ShowEntity(String),

    ///
    /// Shows an achievement. Removed from the protocol after 1.12; still decoded so that older
    /// payloads survive a round trip, but modern callers may ignore it.
    ShowAchievement(String),
}

///
/// A chat component: decorations, color, content, events, and ordered children.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatCompound {
    ///
    /// Bold decoration.
    pub bold: Decoration,

    ///
    /// Italic decoration.
    pub italic: Decoration,

    ///
    /// Underline decoration.
    pub underlined: Decoration,

    ///
    /// Strikethrough decoration.
    pub strikethrough: Decoration,

    ///
    /// Obfuscation decoration.
    pub obfuscated: Decoration,

    ///
    /// The component's color; `None` writes no color tag.
    pub color: Option<&'static ChatColor>,

    ///
    /// Text inserted into the chat input when the component is shift-clicked.
    pub insertion: Option<String>,

    ///
    /// The content trait; `None` renders as empty text.
    pub content: Option<ChatContent>,

    ///
    /// The click event.
    pub click_event: Option<ClickEvent>,

    ///
    /// The hover event.
    pub hover_event: Option<HoverEvent>,

    ///
    /// Ordered child components.
    pub extra: Vec<ChatCompound>,
}

impl ChatCompound {
    ///
    /// Creates an empty component with all decorations inheriting.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    ///
    /// Copies the parent's decorations and color into this component. Called for each `extra`
    /// child before its own fields are applied, so that explicit child fields override the
    /// inherited ones.
    pub fn inherit_style(&mut self, parent: &ChatCompound) {
        self.bold = parent.bold;
        self.italic = parent.italic;
        self.underlined = parent.underlined;
        self.strikethrough = parent.strikethrough;
        self.obfuscated = parent.obfuscated;
        self.color = parent.color;
    }
}

///
/// Reads a chat component from exactly `expected_size` bytes of JSON taken from the stream.
///
/// In tolerant mode unknown keys and mistyped values are skipped; in strict mode they fail with
/// [`ChatError::UnexpectedKey`] / [`ChatError::UnexpectedValue`].
///
/// # Errors
/// Returns `Err` on stream failure, malformed JSON, or any semantic chat error.
pub fn read_chat_compound<S: InputStream + ?Sized>(
    read: &mut S,
    expected_size: usize,
    tolerant: bool,
) -> Result<ChatCompound> {
    let mut bytes = vec![0_u8; expected_size];
    read.read_exact(&mut bytes)?;

    let value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|error| ChatError::Json(error.to_string()))?;

    let mut chat_reader = ChatReader::new(tolerant);
    replay(&value, &mut chat_reader)?;
    chat_reader.finish()
}

///
/// Writes a chat component as canonical JSON, returning the number of bytes written.
///
/// The output is lenient: inherited decorations and absent fields are omitted, and keys are
/// emitted in a fixed order. The result always parses back through [`read_chat_compound`].
///
/// # Errors
/// Returns `Err` on stream failure.
pub fn write_chat_compound<S: OutputStream + ?Sized>(
    write: &mut S,
    compound: &ChatCompound,
) -> Result<usize> {
    let value = writer::to_value(compound);
    let bytes =
        serde_json::to_vec(&value).map_err(|error| ChatError::Json(error.to_string()))?;

    write.write_all(&bytes)?;
    Ok(bytes.len())
}

// Replays a parsed JSON value as the event stream the pushdown reader consumes. Object entries
// keep document order, so first-wins semantics survive the tokenizer.
fn replay(value: &serde_json::Value, chat_reader: &mut ChatReader) -> Result<()> {
    use serde_json::Value;

    match value {
        Value::Null => chat_reader.feed(JsonEvent::Null),
        Value::Bool(value) => chat_reader.feed(JsonEvent::Bool(*value)),
        Value::Number(number) => {
            if let Some(value) = number.as_u64() {
                chat_reader.feed(JsonEvent::Integer(value))
            } else if let Some(value) = number.as_i64() {
                #[allow(clippy::cast_sign_loss, reason = "The event carries the raw bits")]
                chat_reader.feed(JsonEvent::Integer(value as u64))
            } else {
                chat_reader.feed(JsonEvent::Double(number.as_f64().unwrap_or(f64::NAN)))
            }
        }
        Value::String(value) => chat_reader.feed(JsonEvent::Str(value)),
        Value::Array(values) => {
            chat_reader.feed(JsonEvent::StartArray)?;
            for value in values {
                replay(value, chat_reader)?;
            }
            chat_reader.feed(JsonEvent::EndArray)
        }
        Value::Object(entries) => {
            chat_reader.feed(JsonEvent::StartObject)?;
            for (key, value) in entries {
                chat_reader.feed(JsonEvent::Key(key))?;
                replay(value, chat_reader)?;
            }
            chat_reader.feed(JsonEvent::EndObject)
        }
    }
}
