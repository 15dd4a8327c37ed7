//!
//! Canonical JSON encoding of chat components.
//!
//! The wire format is read-tolerant, so the writer picks one canonical shape: keys in a
//! fixed order (decorations, color, insertion, content, with, clickEvent, hoverEvent, extra),
//! inherited decorations and absent fields omitted, decorations as booleans. Everything the
//! writer emits parses back through the reader unchanged.

use crate::{ChatCompound, ChatContent, ClickEvent, Decoration, HoverEvent};
use serde_json::{json, Map, Value};

///
/// Renders a component tree as a JSON value.
#[must_use]
pub fn to_value(compound: &ChatCompound) -> Value {
    let mut out = Map::new();

    decoration(&mut out, "bold", compound.bold);
    decoration(&mut out, "italic", compound.italic);
    decoration(&mut out, "underlined", compound.underlined);
    decoration(&mut out, "strikethrough", compound.strikethrough);
    decoration(&mut out, "obfuscated", compound.obfuscated);

    if let Some(color) = compound.color {
        out.insert("color".into(), Value::String(color.name.into()));
    }

    if let Some(insertion) = &compound.insertion {
        out.insert("insertion".into(), Value::String(insertion.clone()));
    }

    match &compound.content {
        None => {}
        Some(ChatContent::Text { text }) => {
            out.insert("text".into(), Value::String(text.clone()));
        }
        Some(ChatContent::Translate { key, with }) => {
            out.insert("translate".into(), Value::String(key.clone()));

            if !with.is_empty() {
                let substitutions = with.iter().cloned().map(Value::String).collect();
                out.insert("with".into(), Value::Array(substitutions));
            }
        }
        Some(ChatContent::Keybind { key }) => {
            out.insert("keybind".into(), Value::String(key.clone()));
        }
        Some(ChatContent::Score {
            name,
            objective,
            value,
        }) => {
            let mut score = Map::new();
            score.insert("name".into(), Value::String(name.clone()));
            score.insert("objective".into(), Value::String(objective.clone()));

            if let Some(value) = value {
                score.insert("value".into(), Value::String(value.clone()));
            }

            out.insert("score".into(), Value::Object(score));
        }
    }

    if let Some(click) = &compound.click_event {
        let (action, value) = match click {
            ClickEvent::OpenUrl(value) => ("open_url", Value::String(value.clone())),
            ClickEvent::RunCommand(value) => ("run_command", Value::String(value.clone())),
            ClickEvent::SuggestCommand(value) => ("suggest_command", Value::String(value.clone())),
            ClickEvent::ChangePage(page) => ("change_page", json!(page)),
        };

        out.insert(
            "clickEvent".into(),
            json!({ "action": action, "value": value }),
        );
    }

    if let Some(hover) = &compound.hover_event {
        let (action, value) = match hover {
            HoverEvent::ShowText(value) => ("show_text", value),
            HoverEvent::ShowItem(value) => ("show_item", value),
            HoverEvent::ShowEntity(value) => ("show_entity", value),
            HoverEvent::ShowAchievement(value) => ("show_achievement", value),
        };

        out.insert(
            "hoverEvent".into(),
            json!({ "action": action, "value": value }),
        );
    }

    if !compound.extra.is_empty() {
        let children = compound.extra.iter().map(to_value).collect();
        out.insert("extra".into(), Value::Array(children));
    }

    Value::Object(out)
}

fn decoration(out: &mut Map<String, Value>, name: &str, value: Decoration) {
    match value {
        Decoration::Inherit => {}
        Decoration::Enabled => {
            out.insert(name.into(), Value::Bool(true));
        }
        Decoration::Disabled => {
            out.insert(name.into(), Value::Bool(false));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::writer::to_value;
    use crate::{
        lookup_color, read_chat_compound, ChatCompound, ChatContent, ClickEvent, Decoration,
        HoverEvent,
    };
    use sculk_stream::SliceInput;

    fn round_trip(compound: &ChatCompound) -> ChatCompound {
        let bytes = serde_json::to_vec(&to_value(compound)).unwrap();
        read_chat_compound(&mut SliceInput::new(&bytes), bytes.len(), false).unwrap()
    }

    #[test]
    fn writes_canonical_key_order() {
        let mut compound = ChatCompound::new();
        compound.bold = Decoration::Enabled;
        compound.color = lookup_color("gold");
        compound.content = Some(ChatContent::Text { text: "hi".into() });

        let rendered = serde_json::to_string(&to_value(&compound)).unwrap();
        assert_eq!(r#"{"bold":true,"color":"gold","text":"hi"}"#, rendered);
    }

    #[test]
    fn omits_inherited_and_absent_fields() {
        let rendered = serde_json::to_string(&to_value(&ChatCompound::new())).unwrap();
        assert_eq!("{}", rendered);
    }

    #[test]
    fn full_tree_round_trips() {
        let mut child = ChatCompound::new();
        child.bold = Decoration::Enabled;
        // matches what the reader's style inheritance resolves for this parent; a plain
        // `Inherit` would come back as the parent's explicit value
        child.italic = Decoration::Disabled;
        child.color = lookup_color("red");
        child.content = Some(ChatContent::Translate {
            key: "death.fell".into(),
            with: vec!["alice".into(), "bob".into()],
        });

        let mut compound = ChatCompound::new();
        compound.italic = Decoration::Disabled;
        compound.color = lookup_color("white");
        compound.insertion = Some("/tp".into());
        compound.content = Some(ChatContent::Text { text: "root".into() });
        compound.click_event = Some(ClickEvent::RunCommand("/spawn".into()));
        compound.hover_event = Some(HoverEvent::ShowText("tip".into()));
        compound.extra.push(child);

        assert_eq!(compound, round_trip(&compound));
    }

    #[test]
    fn change_page_round_trips() {
        let mut compound = ChatCompound::new();
        compound.content = Some(ChatContent::Text { text: "next".into() });
        compound.click_event = Some(ClickEvent::ChangePage(7));

        assert_eq!(compound, round_trip(&compound));
    }

    #[test]
    fn score_round_trips() {
        let mut compound = ChatCompound::new();
        compound.content = Some(ChatContent::Score {
            name: "alice".into(),
            objective: "kills".into(),
            value: Some("12".into()),
        });

        assert_eq!(compound, round_trip(&compound));
    }

    #[test]
    fn achievement_round_trips() {
        let mut compound = ChatCompound::new();
        compound.content = Some(ChatContent::Text { text: "t".into() });
        compound.hover_event = Some(HoverEvent::ShowAchievement("achievement.mine".into()));

        assert_eq!(compound, round_trip(&compound));
    }
}
