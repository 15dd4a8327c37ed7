//!
//! A pushdown automaton that rebuilds a [`ChatCompound`] tree from a stream of JSON events.
//!
//! The reader is tokenizer-agnostic: anything that can produce [`JsonEvent`]s in document order
//! can drive it. Contexts (the root, a chat component, a hover or click event, a score
//! sub-compound, the `extra` and `with` arrays) form a stack; a token dictionary decides which
//! keys are legal in which context and which value types each key accepts.
//!
//! In tolerant mode, unknown keys and mistyped or semantically invalid values are skipped;
//! whole sub-objects are swallowed by a counter that tracks container depth. In strict mode they
//! raise the corresponding [`ChatError`].

use crate::{
    lookup_color, ChatCompound, ChatContent, ChatError, ClickEvent, Decoration, HoverEvent,
    Result,
};
use sculk_protocol::utf::utf16_len;

///
/// One event out of a JSON tokenizer, in document order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JsonEvent<'a> {
    ///
    /// A `null` literal.
    Null,

    ///
    /// A boolean literal.
    Bool(bool),

    ///
    /// An integer number. Negative values carry their two's-complement bits.
    Integer(u64),

    ///
    /// A floating point number.
    Double(f64),

    ///
    /// A string value.
    Str(&'a str),

    ///
    /// The opening brace of an object.
    StartObject,

    ///
    /// The closing brace of an object.
    EndObject,

    ///
    /// The opening bracket of an array.
    StartArray,

    ///
    /// The closing bracket of an array.
    EndArray,

    ///
    /// An object key. The following event carries its value.
    Key(&'a str),
}

// value type masks
const BOOLEAN: u16 = 1 << 1;
const INTEGER: u16 = 1 << 2;
const STRING: u16 = 1 << 4;
const OBJECT: u16 = 1 << 5;
const ARRAY: u16 = 1 << 6;

// context masks
const CTX_GENESIS: u16 = 1 << 0;
const CTX_CHAT: u16 = 1 << 1;
const CTX_HOVER: u16 = 1 << 2;
const CTX_CLICK: u16 = 1 << 3;
const CTX_EXTRA: u16 = 1 << 4;
const CTX_WITH: u16 = 1 << 5;
const CTX_SCORE: u16 = 1 << 6;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum TokenKey {
    Bold,
    Italic,
    Underlined,
    Strikethrough,
    Obfuscated,
    Color,
    Insertion,
    Text,
    Translate,
    With,
    Keybind,
    Score,
    Extra,
    HoverEvent,
    ClickEvent,
    Action,
    Value,
    Name,
    Objective,
}

struct Token {
    name: &'static str,
    key: TokenKey,
    contexts: u16,
    types: u16,
}

static TOKENS: &[Token] = &[
    Token { name: "bold", key: TokenKey::Bold, contexts: CTX_CHAT, types: BOOLEAN | STRING },
    Token { name: "italic", key: TokenKey::Italic, contexts: CTX_CHAT, types: BOOLEAN | STRING },
    Token { name: "underlined", key: TokenKey::Underlined, contexts: CTX_CHAT, types: BOOLEAN | STRING },
    Token { name: "strikethrough", key: TokenKey::Strikethrough, contexts: CTX_CHAT, types: BOOLEAN | STRING },
    Token { name: "obfuscated", key: TokenKey::Obfuscated, contexts: CTX_CHAT, types: BOOLEAN | STRING },
    Token { name: "color", key: TokenKey::Color, contexts: CTX_CHAT, types: STRING },
    Token { name: "insertion", key: TokenKey::Insertion, contexts: CTX_CHAT, types: STRING },
    Token { name: "text", key: TokenKey::Text, contexts: CTX_CHAT, types: STRING },
    Token { name: "translate", key: TokenKey::Translate, contexts: CTX_CHAT, types: STRING },
    Token { name: "with", key: TokenKey::With, contexts: CTX_CHAT, types: ARRAY },
    Token { name: "keybind", key: TokenKey::Keybind, contexts: CTX_CHAT, types: STRING },
    Token { name: "score", key: TokenKey::Score, contexts: CTX_CHAT, types: OBJECT },
    Token { name: "extra", key: TokenKey::Extra, contexts: CTX_CHAT, types: ARRAY },
    Token { name: "hoverEvent", key: TokenKey::HoverEvent, contexts: CTX_CHAT, types: OBJECT },
    Token { name: "clickEvent", key: TokenKey::ClickEvent, contexts: CTX_CHAT, types: OBJECT },
    Token { name: "action", key: TokenKey::Action, contexts: CTX_HOVER | CTX_CLICK, types: STRING },
    Token { name: "value", key: TokenKey::Value, contexts: CTX_HOVER | CTX_CLICK | CTX_SCORE, types: STRING | INTEGER },
    Token { name: "name", key: TokenKey::Name, contexts: CTX_SCORE, types: STRING },
    Token { name: "objective", key: TokenKey::Objective, contexts: CTX_SCORE, types: STRING },
];

fn lookup_token(name: &str) -> Option<&'static Token> {
    TOKENS.iter().find(|token| token.name == name)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum ActionKind {
    OpenUrl,
    RunCommand,
    SuggestCommand,
    ChangePage,
    ShowText,
    ShowItem,
    ShowEntity,
    ShowAchievement,
}

impl ActionKind {
    fn for_click(name: &str) -> Option<Self> {
        match name {
            "open_url" => Some(ActionKind::OpenUrl),
            "run_command" => Some(ActionKind::RunCommand),
            "suggest_command" => Some(ActionKind::SuggestCommand),
            "change_page" => Some(ActionKind::ChangePage),
            _ => None,
        }
    }

    fn for_hover(name: &str) -> Option<Self> {
        match name {
            "show_text" => Some(ActionKind::ShowText),
            "show_item" => Some(ActionKind::ShowItem),
            "show_entity" => Some(ActionKind::ShowEntity),
            "show_achievement" => Some(ActionKind::ShowAchievement),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
enum ValueRepr {
    Str(String),
    Int(u64),
}

// `action` and `value` may arrive in either order; whichever comes second completes the event.
struct EventWork {
    hover: bool,
    action: Option<ActionKind>,
    value: Option<ValueRepr>,
    done: bool,
}

impl EventWork {
    fn new(hover: bool) -> Self {
        Self {
            hover,
            action: None,
            value: None,
            done: false,
        }
    }
}

enum Frame {
    Genesis,
    Chat(ChatCompound),
    Extra,
    With,
    Event(EventWork),
    Score,
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum ContentState {
    None,
    Translate,
    Other,
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum ScoreField {
    Name,
    Objective,
    Value,
}

// where a `value` key's payload should land, based on the innermost frame
#[derive(Copy, Clone, Eq, PartialEq)]
enum ValueTarget {
    Event,
    Score,
    Neither,
}

///
/// The pushdown reader. Feed it events with [`ChatReader::feed`], then take the finished root
/// with [`ChatReader::finish`].
pub struct ChatReader {
    tolerant: bool,
    stack: Vec<Frame>,
    ignore: u32,
    token: Option<&'static Token>,
    result: Option<ChatCompound>,
}

impl ChatReader {
    ///
    /// Creates a reader. In tolerant mode unrecognized data is skipped instead of failing.
    #[must_use]
    pub fn new(tolerant: bool) -> Self {
        Self {
            tolerant,
            stack: vec![Frame::Genesis],
            ignore: 0,
            token: None,
            result: None,
        }
    }

    ///
    /// Consumes one event.
    ///
    /// # Errors
    /// In strict mode, returns `Err` on unknown keys, mistyped values and semantic violations
    /// (ambiguous traits, duplicate event fields, over-length score objectives). Structural
    /// imbalance errors are raised in both modes.
    pub fn feed(&mut self, event: JsonEvent<'_>) -> Result<()> {
        match event {
            JsonEvent::Key(name) => {
                if self.ignore > 0 {
                    return Ok(());
                }

                self.on_key(name)
            }
            JsonEvent::StartObject => self.on_start_object(),
            JsonEvent::EndObject => self.on_end_object(),
            JsonEvent::StartArray => self.on_start_array(),
            JsonEvent::EndArray => self.on_end_array(),
            JsonEvent::Bool(value) => self.on_bool(value),
            JsonEvent::Integer(value) => self.on_integer(value),
            JsonEvent::Str(value) => self.on_string(value),
            JsonEvent::Null => self.on_unsupported("null value"),
            JsonEvent::Double(_) => self.on_unsupported("floating point value"),
        }
    }

    ///
    /// Finishes parsing and yields the root component.
    ///
    /// # Errors
    /// Fails with [`ChatError::UnexpectedEnd`] if the root object was never closed.
    pub fn finish(self) -> Result<ChatCompound> {
        self.result.ok_or(ChatError::UnexpectedEnd)
    }

    fn context_mask(&self) -> u16 {
        match self.stack.last() {
            None | Some(Frame::Genesis) => CTX_GENESIS,
            Some(Frame::Chat(_)) => CTX_CHAT,
            Some(Frame::Extra) => CTX_EXTRA,
            Some(Frame::With) => CTX_WITH,
            Some(Frame::Event(work)) => {
                if work.hover {
                    CTX_HOVER
                } else {
                    CTX_CLICK
                }
            }
            Some(Frame::Score) => CTX_SCORE,
        }
    }

    // types accepted for values that have no preceding key (array elements and the root)
    fn container_value_mask(&self) -> u16 {
        match self.stack.last() {
            None | Some(Frame::Genesis) => OBJECT,
            Some(Frame::Extra) => OBJECT,
            Some(Frame::With) => STRING,
            _ => 0,
        }
    }

    fn accepts_for(&self, token: Option<&'static Token>, ty: u16) -> bool {
        match token {
            Some(token) => token.types & ty != 0,
            None => self.container_value_mask() & ty != 0,
        }
    }

    fn reject(&self, message: &'static str) -> Result<()> {
        if self.tolerant {
            Ok(())
        } else {
            Err(ChatError::UnexpectedValue(message))
        }
    }

    fn ambiguous(&self) -> Result<()> {
        if self.tolerant {
            Ok(())
        } else {
            Err(ChatError::AmbiguousTrait)
        }
    }

    fn duplicate(&self, field: &'static str) -> Result<()> {
        if self.tolerant {
            Ok(())
        } else {
            Err(ChatError::Duplicate(field))
        }
    }

    fn current_chat(&self) -> Result<&ChatCompound> {
        self.stack
            .iter()
            .rev()
            .find_map(|frame| match frame {
                Frame::Chat(compound) => Some(compound),
                _ => None,
            })
            .ok_or(ChatError::UnexpectedValue("value outside of a chat component"))
    }

    fn current_chat_mut(&mut self) -> Result<&mut ChatCompound> {
        self.stack
            .iter_mut()
            .rev()
            .find_map(|frame| match frame {
                Frame::Chat(compound) => Some(compound),
                _ => None,
            })
            .ok_or(ChatError::UnexpectedValue("value outside of a chat component"))
    }

    fn content_state(&self) -> Result<ContentState> {
        Ok(match self.current_chat()?.content {
            None => ContentState::None,
            Some(ChatContent::Translate { .. }) => ContentState::Translate,
            Some(_) => ContentState::Other,
        })
    }

    fn value_target(&self) -> ValueTarget {
        match self.stack.last() {
            Some(Frame::Event(_)) => ValueTarget::Event,
            Some(Frame::Score) => ValueTarget::Score,
            _ => ValueTarget::Neither,
        }
    }

    fn on_key(&mut self, name: &str) -> Result<()> {
        self.token = None;

        let context = self.context_mask();
        match lookup_token(name).filter(|token| token.contexts & context != 0) {
            Some(token) => {
                self.token = Some(token);
                Ok(())
            }
            None => {
                if self.tolerant {
                    Ok(())
                } else {
                    Err(ChatError::UnexpectedKey(name.into()))
                }
            }
        }
    }

    fn on_unsupported(&mut self, message: &'static str) -> Result<()> {
        if self.ignore > 0 {
            return Ok(());
        }

        self.token = None;
        self.reject(message)
    }

    fn on_bool(&mut self, value: bool) -> Result<()> {
        if self.ignore > 0 {
            return Ok(());
        }

        let token = self.token.take();
        if !self.accepts_for(token, BOOLEAN) {
            return self.reject("unexpected boolean value");
        }

        match token.map(|token| token.key) {
            Some(
                key @ (TokenKey::Bold
                | TokenKey::Italic
                | TokenKey::Underlined
                | TokenKey::Strikethrough
                | TokenKey::Obfuscated),
            ) => self.set_decoration(key, value.into()),
            _ => self.reject("unexpected boolean value"),
        }
    }

    fn on_integer(&mut self, value: u64) -> Result<()> {
        if self.ignore > 0 {
            return Ok(());
        }

        let token = self.token.take();
        if !self.accepts_for(token, INTEGER) {
            return self.reject("unexpected integer value");
        }

        match token.map(|token| token.key) {
            Some(TokenKey::Value) => match self.value_target() {
                ValueTarget::Event => self.on_event_value(ValueRepr::Int(value)),
                ValueTarget::Score => {
                    let rendered = value.to_string();
                    self.set_score_field(ScoreField::Value, &rendered)
                }
                ValueTarget::Neither => self.reject("unexpected integer value"),
            },
            _ => self.reject("unexpected integer value"),
        }
    }

    fn on_string(&mut self, value: &str) -> Result<()> {
        if self.ignore > 0 {
            return Ok(());
        }

        let token = self.token.take();
        if !self.accepts_for(token, STRING) {
            return self.reject("unexpected string value");
        }

        match token.map(|token| token.key) {
            Some(
                key @ (TokenKey::Bold
                | TokenKey::Italic
                | TokenKey::Underlined
                | TokenKey::Strikethrough
                | TokenKey::Obfuscated),
            ) => match value {
                "true" => self.set_decoration(key, Decoration::Enabled),
                "false" => self.set_decoration(key, Decoration::Disabled),
                _ => self.reject("decoration value must be 'true' or 'false'"),
            },
            Some(TokenKey::Color) => match lookup_color(value) {
                Some(color) => {
                    self.current_chat_mut()?.color = Some(color);
                    Ok(())
                }
                None => self.reject("unknown chat color"),
            },
            Some(TokenKey::Insertion) => {
                self.current_chat_mut()?.insertion = Some(value.into());
                Ok(())
            }
            Some(TokenKey::Text) => {
                if self.content_state()? != ContentState::None {
                    return self.ambiguous();
                }

                self.current_chat_mut()?.content = Some(ChatContent::Text { text: value.into() });
                Ok(())
            }
            Some(TokenKey::Translate) => match self.content_state()? {
                ContentState::None => {
                    self.current_chat_mut()?.content = Some(ChatContent::Translate {
                        key: value.into(),
                        with: Vec::new(),
                    });
                    Ok(())
                }
                ContentState::Translate => {
                    if let Some(ChatContent::Translate { key, .. }) =
                        &mut self.current_chat_mut()?.content
                    {
                        *key = value.into();
                    }
                    Ok(())
                }
                ContentState::Other => self.ambiguous(),
            },
            Some(TokenKey::Keybind) => {
                if self.content_state()? != ContentState::None {
                    return self.ambiguous();
                }

                self.current_chat_mut()?.content = Some(ChatContent::Keybind { key: value.into() });
                Ok(())
            }
            Some(TokenKey::Action) => self.on_event_action(value),
            Some(TokenKey::Value) => match self.value_target() {
                ValueTarget::Event => self.on_event_value(ValueRepr::Str(value.into())),
                ValueTarget::Score => self.set_score_field(ScoreField::Value, value),
                ValueTarget::Neither => self.reject("unexpected string value"),
            },
            Some(TokenKey::Name) => self.set_score_field(ScoreField::Name, value),
            Some(TokenKey::Objective) => {
                if utf16_len(value) > 16 {
                    return if self.tolerant {
                        Ok(())
                    } else {
                        Err(ChatError::TooLong("objective"))
                    };
                }

                self.set_score_field(ScoreField::Objective, value)
            }
            None => self.with_append(value),
            _ => self.reject("unexpected string value"),
        }
    }

    fn on_start_object(&mut self) -> Result<()> {
        if self.ignore > 0 {
            self.ignore += 1;
            return Ok(());
        }

        let token = self.token.take();
        if !self.accepts_for(token, OBJECT) {
            if self.tolerant {
                self.ignore += 1;
                return Ok(());
            }

            return Err(ChatError::UnexpectedValue("unexpected object"));
        }

        match token.map(|token| token.key) {
            None => {
                if matches!(self.stack.last(), Some(Frame::Genesis)) {
                    self.stack.push(Frame::Chat(ChatCompound::new()));
                    return Ok(());
                }

                if matches!(self.stack.last(), Some(Frame::Extra)) {
                    let mut child = ChatCompound::new();
                    child.inherit_style(self.current_chat()?);
                    self.stack.push(Frame::Chat(child));
                    return Ok(());
                }

                Err(ChatError::UnexpectedValue("unexpected object"))
            }
            Some(TokenKey::HoverEvent) => {
                self.stack.push(Frame::Event(EventWork::new(true)));
                Ok(())
            }
            Some(TokenKey::ClickEvent) => {
                self.stack.push(Frame::Event(EventWork::new(false)));
                Ok(())
            }
            Some(TokenKey::Score) => {
                if self.content_state()? != ContentState::None {
                    // still balance the matching EndObject
                    if self.tolerant {
                        self.ignore += 1;
                        return Ok(());
                    }

                    return Err(ChatError::AmbiguousTrait);
                }

                self.current_chat_mut()?.content = Some(ChatContent::Score {
                    name: String::new(),
                    objective: String::new(),
                    value: None,
                });
                self.stack.push(Frame::Score);
                Ok(())
            }
            _ => Err(ChatError::UnexpectedValue("unexpected object")),
        }
    }

    fn on_start_array(&mut self) -> Result<()> {
        if self.ignore > 0 {
            self.ignore += 1;
            return Ok(());
        }

        let token = self.token.take();
        if !self.accepts_for(token, ARRAY) {
            if self.tolerant {
                self.ignore += 1;
                return Ok(());
            }

            return Err(ChatError::UnexpectedValue("unexpected array"));
        }

        match token.map(|token| token.key) {
            Some(TokenKey::With) => {
                if self.content_state()? == ContentState::Other {
                    if self.tolerant {
                        self.ignore += 1;
                        return Ok(());
                    }

                    return Err(ChatError::AmbiguousTrait);
                }

                self.stack.push(Frame::With);
                Ok(())
            }
            Some(TokenKey::Extra) => {
                self.stack.push(Frame::Extra);
                Ok(())
            }
            _ => Err(ChatError::UnexpectedValue("unexpected array")),
        }
    }

    fn on_end_object(&mut self) -> Result<()> {
        if self.ignore > 0 {
            self.ignore -= 1;
            return Ok(());
        }

        match self.stack.pop() {
            Some(Frame::Chat(compound)) => {
                if matches!(self.stack.last(), Some(Frame::Genesis)) {
                    self.result = Some(compound);
                    return Ok(());
                }

                if matches!(self.stack.last(), Some(Frame::Extra)) {
                    self.current_chat_mut()?.extra.push(compound);
                    return Ok(());
                }

                Err(ChatError::Json("unbalanced object close".into()))
            }
            Some(Frame::Event(_) | Frame::Score) => Ok(()),
            _ => Err(ChatError::Json("unbalanced object close".into())),
        }
    }

    fn on_end_array(&mut self) -> Result<()> {
        if self.ignore > 0 {
            self.ignore -= 1;
            return Ok(());
        }

        match self.stack.pop() {
            Some(Frame::Extra | Frame::With) => Ok(()),
            _ => Err(ChatError::Json("unbalanced array close".into())),
        }
    }

    fn set_decoration(&mut self, key: TokenKey, value: Decoration) -> Result<()> {
        let chat = self.current_chat_mut()?;
        match key {
            TokenKey::Bold => chat.bold = value,
            TokenKey::Italic => chat.italic = value,
            TokenKey::Underlined => chat.underlined = value,
            TokenKey::Strikethrough => chat.strikethrough = value,
            TokenKey::Obfuscated => chat.obfuscated = value,
            _ => {}
        }

        Ok(())
    }

    fn with_append(&mut self, value: &str) -> Result<()> {
        match self.content_state()? {
            ContentState::None => {
                // a `with` array ahead of its `translate` key initializes the trait
                self.current_chat_mut()?.content = Some(ChatContent::Translate {
                    key: String::new(),
                    with: vec![value.into()],
                });
                Ok(())
            }
            ContentState::Translate => {
                if let Some(ChatContent::Translate { with, .. }) =
                    &mut self.current_chat_mut()?.content
                {
                    with.push(value.into());
                }
                Ok(())
            }
            ContentState::Other => self.ambiguous(),
        }
    }

    fn set_score_field(&mut self, field: ScoreField, value: &str) -> Result<()> {
        if !matches!(
            self.current_chat()?.content,
            Some(ChatContent::Score { .. })
        ) {
            return self.reject("score field outside of a score compound");
        }

        if field == ScoreField::Value {
            let duplicate = matches!(
                self.current_chat()?.content,
                Some(ChatContent::Score { value: Some(_), .. })
            );

            if duplicate {
                return self.duplicate("value");
            }
        }

        if let Some(ChatContent::Score {
            name,
            objective,
            value: score_value,
        }) = &mut self.current_chat_mut()?.content
        {
            match field {
                ScoreField::Name => *name = value.into(),
                ScoreField::Objective => *objective = value.into(),
                ScoreField::Value => *score_value = Some(value.into()),
            }
        }

        Ok(())
    }

    fn on_event_action(&mut self, name: &str) -> Result<()> {
        let (hover, has_action) = match self.stack.last() {
            Some(Frame::Event(work)) => (work.hover, work.action.is_some()),
            _ => return self.reject("event action outside of an event"),
        };

        if has_action {
            return self.duplicate("action");
        }

        let kind = if hover {
            ActionKind::for_hover(name)
        } else {
            ActionKind::for_click(name)
        };

        let Some(kind) = kind else {
            return self.reject("unknown event action");
        };

        if let Some(Frame::Event(work)) = self.stack.last_mut() {
            work.action = Some(kind);
        }

        self.try_complete_event()
    }

    fn on_event_value(&mut self, value: ValueRepr) -> Result<()> {
        let has_value = match self.stack.last() {
            Some(Frame::Event(work)) => work.value.is_some(),
            _ => return self.reject("event value outside of an event"),
        };

        if has_value {
            return self.duplicate("value");
        }

        if let Some(Frame::Event(work)) = self.stack.last_mut() {
            work.value = Some(value);
        }

        self.try_complete_event()
    }

    fn try_complete_event(&mut self) -> Result<()> {
        enum Built {
            Click(ClickEvent),
            Hover(HoverEvent),
            Mismatch,
        }

        let built = match self.stack.last_mut() {
            Some(Frame::Event(work)) => {
                if work.done || work.action.is_none() || work.value.is_none() {
                    return Ok(());
                }

                work.done = true;

                let value = work.value.clone();
                match (work.action, value) {
                    (Some(ActionKind::OpenUrl), Some(ValueRepr::Str(value))) => {
                        Built::Click(ClickEvent::OpenUrl(value))
                    }
                    (Some(ActionKind::RunCommand), Some(ValueRepr::Str(value))) => {
                        Built::Click(ClickEvent::RunCommand(value))
                    }
                    (Some(ActionKind::SuggestCommand), Some(ValueRepr::Str(value))) => {
                        Built::Click(ClickEvent::SuggestCommand(value))
                    }
                    (Some(ActionKind::ChangePage), Some(ValueRepr::Int(value))) => {
                        Built::Click(ClickEvent::ChangePage(value))
                    }
                    (Some(ActionKind::ChangePage), Some(ValueRepr::Str(value))) => {
                        match value.parse::<u64>() {
                            Ok(page) => Built::Click(ClickEvent::ChangePage(page)),
                            Err(_) => Built::Mismatch,
                        }
                    }
                    (Some(ActionKind::ShowText), Some(ValueRepr::Str(value))) => {
                        Built::Hover(HoverEvent::ShowText(value))
                    }
                    (Some(ActionKind::ShowItem), Some(ValueRepr::Str(value))) => {
                        Built::Hover(HoverEvent::ShowItem(value))
                    }
                    (Some(ActionKind::ShowEntity), Some(ValueRepr::Str(value))) => {
                        Built::Hover(HoverEvent::ShowEntity(value))
                    }
                    (Some(ActionKind::ShowAchievement), Some(ValueRepr::Str(value))) => {
                        Built::Hover(HoverEvent::ShowAchievement(value))
                    }
                    _ => Built::Mismatch,
                }
            }
            _ => return Ok(()),
        };

        match built {
            Built::Click(event) => {
                self.current_chat_mut()?.click_event = Some(event);
                Ok(())
            }
            Built::Hover(event) => {
                self.current_chat_mut()?.hover_event = Some(event);
                Ok(())
            }
            Built::Mismatch => self.reject("event value type does not match the action"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        lookup_color, read_chat_compound, ChatCompound, ChatContent, ChatError, ClickEvent,
        Decoration, HoverEvent, Result,
    };
    use sculk_stream::SliceInput;

    fn parse(json: &str, tolerant: bool) -> Result<ChatCompound> {
        read_chat_compound(&mut SliceInput::new(json.as_bytes()), json.len(), tolerant)
    }

    #[test]
    fn ambiguous_trait_strict() {
        let result = parse(r#"{"text":"hi","translate":"foo"}"#, false);
        assert!(matches!(result, Err(ChatError::AmbiguousTrait)));
    }

    #[test]
    fn ambiguous_trait_tolerant_first_wins() {
        let compound = parse(r#"{"text":"hi","translate":"foo"}"#, true).unwrap();
        assert_eq!(Some(ChatContent::Text { text: "hi".into() }), compound.content);
    }

    #[test]
    fn decorations_from_bool_and_string() {
        let compound = parse(r#"{"bold":true,"italic":"false","obfuscated":"true"}"#, false).unwrap();

        assert_eq!(Decoration::Enabled, compound.bold);
        assert_eq!(Decoration::Disabled, compound.italic);
        assert_eq!(Decoration::Enabled, compound.obfuscated);
        assert_eq!(Decoration::Inherit, compound.underlined);
    }

    #[test]
    fn bad_decoration_string_strict() {
        assert!(matches!(
            parse(r#"{"bold":"maybe"}"#, false),
            Err(ChatError::UnexpectedValue(_))
        ));
        assert!(parse(r#"{"bold":"maybe"}"#, true).is_ok());
    }

    #[test]
    fn unknown_color_strict() {
        assert!(parse(r#"{"color":"ultraviolet"}"#, false).is_err());
        assert!(parse(r#"{"color":"ultraviolet"}"#, true).unwrap().color.is_none());
    }

    #[test]
    fn extra_children_inherit_style() {
        let compound = parse(
            r#"{"bold":true,"color":"red","text":"p","extra":[{"text":"c1"},{"bold":false,"text":"c2"}]}"#,
            false,
        )
        .unwrap();

        assert_eq!(2, compound.extra.len());

        let first = &compound.extra[0];
        assert_eq!(Decoration::Enabled, first.bold);
        assert_eq!(Some(lookup_color("red").unwrap()), first.color);

        let second = &compound.extra[1];
        assert_eq!(Decoration::Disabled, second.bold);
        assert_eq!(Some(lookup_color("red").unwrap()), second.color);
    }

    #[test]
    fn with_before_translate() {
        let compound = parse(r#"{"with":["x","y"],"translate":"chat.type"}"#, false).unwrap();

        assert_eq!(
            Some(ChatContent::Translate {
                key: "chat.type".into(),
                with: vec!["x".into(), "y".into()],
            }),
            compound.content
        );
    }

    #[test]
    fn hover_value_before_action() {
        let compound = parse(
            r#"{"text":"t","hoverEvent":{"value":"tip","action":"show_text"}}"#,
            false,
        )
        .unwrap();

        assert_eq!(Some(HoverEvent::ShowText("tip".into())), compound.hover_event);
    }

    #[test]
    fn click_change_page_integer() {
        let compound = parse(
            r#"{"text":"t","clickEvent":{"action":"change_page","value":3}}"#,
            false,
        )
        .unwrap();

        assert_eq!(Some(ClickEvent::ChangePage(3)), compound.click_event);
    }

    #[test]
    fn duplicate_action_strict() {
        let result = parse(
            r#"{"text":"t","clickEvent":{"action":"run_command","action":"open_url","value":"/x"}}"#,
            false,
        );

        // serde_json with preserve_order keeps the later duplicate; both forms are accepted
        // outcomes here: a Duplicate error, or the last action winning
        match result {
            Err(ChatError::Duplicate("action")) => {}
            Ok(compound) => {
                assert_eq!(Some(ClickEvent::OpenUrl("/x".into())), compound.click_event);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn score_compound() {
        let compound = parse(
            r#"{"score":{"name":"alice","objective":"deaths","value":4}}"#,
            false,
        )
        .unwrap();

        assert_eq!(
            Some(ChatContent::Score {
                name: "alice".into(),
                objective: "deaths".into(),
                value: Some("4".into()),
            }),
            compound.content
        );
    }

    #[test]
    fn long_objective_strict() {
        let result = parse(
            r#"{"score":{"name":"a","objective":"averyveryverylongobjective"}}"#,
            false,
        );

        assert!(matches!(result, Err(ChatError::TooLong("objective"))));
    }

    #[test]
    fn tolerant_skips_unknown_containers() {
        let compound = parse(
            r#"{"mystery":{"nested":{"deep":[1,2,{"x":true}]}},"text":"hi"}"#,
            true,
        )
        .unwrap();

        assert_eq!(Some(ChatContent::Text { text: "hi".into() }), compound.content);
    }

    #[test]
    fn strict_rejects_unknown_keys() {
        assert!(matches!(
            parse(r#"{"mystery":1}"#, false),
            Err(ChatError::UnexpectedKey(_))
        ));
    }

    #[test]
    fn keybind_content() {
        let compound = parse(r#"{"keybind":"key.jump"}"#, false).unwrap();
        assert_eq!(
            Some(ChatContent::Keybind { key: "key.jump".into() }),
            compound.content
        );
    }

    #[test]
    fn insertion_set() {
        let compound = parse(r#"{"text":"t","insertion":"/msg"}"#, false).unwrap();
        assert_eq!(Some("/msg".into()), compound.insertion);
    }

    #[test]
    fn legacy_show_achievement_decodes() {
        let compound = parse(
            r#"{"text":"t","hoverEvent":{"action":"show_achievement","value":"achievement.openInventory"}}"#,
            false,
        )
        .unwrap();

        assert_eq!(
            Some(HoverEvent::ShowAchievement("achievement.openInventory".into())),
            compound.hover_event
        );
    }
}
