use std::collections::BTreeMap;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app_config::{InputDefinition, InputKind};
use crate::app_error::AppError;
use crate::slack_client::ChatClient;

const CALLBACK_ID: &str = "default_modal";
const SUBMIT_LABEL: &str = "Submit";
const CLOSE_LABEL: &str = "Cancel";
const STATIC_SELECT: &str = "static_select";

/// Field key to submitted value, one entry per input block.
pub type FieldValues = BTreeMap<String, String>;

// https://api.slack.com/reference/block-kit/composition-objects#text
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TextObject {
    r#type: &'static str,
    text: String,
}

fn plain_text(text: &str) -> TextObject {
    TextObject {
        r#type: "plain_text",
        text: text.to_string(),
    }
}

fn placeholder(text: &str) -> Option<TextObject> {
    (!text.is_empty()).then(|| plain_text(text))
}

// https://api.slack.com/reference/block-kit/composition-objects#option
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OptionObject {
    text: TextObject,
    value: String,
}

// https://api.slack.com/reference/block-kit/block-elements
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockElement {
    PlainTextInput {
        action_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<TextObject>,
        multiline: bool,
    },
    StaticSelect {
        action_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<TextObject>,
        options: Vec<OptionObject>,
    },
}

// https://api.slack.com/reference/block-kit/blocks#input
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct InputBlock {
    r#type: &'static str,
    block_id: String,
    label: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<TextObject>,
    optional: bool,
    element: BlockElement,
}

// https://api.slack.com/reference/surfaces/views
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ModalView {
    r#type: &'static str,
    callback_id: &'static str,
    title: TextObject,
    submit: TextObject,
    close: TextObject,
    blocks: Vec<InputBlock>,
}

#[cfg(test)]
impl ModalView {
    pub fn blocks(&self) -> &[InputBlock] {
        &self.blocks
    }
}

#[cfg(test)]
impl InputBlock {
    pub fn block_id(&self) -> &str {
        &self.block_id
    }

    pub fn element(&self) -> &BlockElement {
        &self.element
    }
}

/// A dialog waiting to be opened with a trigger token.
#[derive(Debug, Clone)]
pub struct SlackModal {
    trigger_id: String,
    view: ModalView,
}

impl SlackModal {
    pub fn new(title: &str, trigger_id: &str) -> Self {
        let view = ModalView {
            r#type: "modal",
            callback_id: CALLBACK_ID,
            title: plain_text(title),
            submit: plain_text(SUBMIT_LABEL),
            close: plain_text(CLOSE_LABEL),
            blocks: Vec::new(),
        };
        Self {
            trigger_id: trigger_id.to_string(),
            view,
        }
    }

    /// Builds one input block per definition; kinds the dialog cannot render are skipped.
    pub fn from_definitions(title: &str, trigger_id: &str, inputs: &[InputDefinition]) -> Self {
        let mut modal = Self::new(title, trigger_id);
        for input in inputs {
            match input.kind {
                InputKind::Text => {
                    modal.add_text_input(&input.key, &input.label, &input.placeholder, input.required);
                }
                InputKind::Select => {
                    let options: Vec<&str> = input.options.iter().map(|o| o.text.as_str()).collect();
                    modal.add_select_input(&input.key, &input.label, &input.placeholder, &options, input.required);
                }
                InputKind::Unsupported => {
                    debug!(key = %input.key, "skipping input with unsupported type");
                }
            }
        }
        modal
    }

    pub fn add_text_input(&mut self, block_id: &str, label: &str, placeholder_text: &str, required: bool) -> &mut Self {
        let element = BlockElement::PlainTextInput {
            action_id: block_id.to_string(),
            placeholder: placeholder(placeholder_text),
            multiline: false,
        };
        self.push_block(block_id, label, placeholder(placeholder_text), required, element)
    }

    pub fn add_select_input(
        &mut self,
        block_id: &str,
        label: &str,
        placeholder_text: &str,
        options: &[&str],
        required: bool,
    ) -> &mut Self {
        let options = options
            .iter()
            .map(|option| OptionObject {
                text: plain_text(option),
                value: option.to_string(),
            })
            .collect();
        let element = BlockElement::StaticSelect {
            action_id: block_id.to_string(),
            placeholder: placeholder(placeholder_text),
            options,
        };
        self.push_block(block_id, label, None, required, element)
    }

    fn push_block(
        &mut self,
        block_id: &str,
        label: &str,
        hint: Option<TextObject>,
        required: bool,
        element: BlockElement,
    ) -> &mut Self {
        self.view.blocks.push(InputBlock {
            r#type: "input",
            block_id: block_id.to_string(),
            label: plain_text(label),
            hint,
            optional: !required,
            element,
        });
        self
    }

    #[cfg(test)]
    pub fn trigger_id(&self) -> &str {
        &self.trigger_id
    }

    #[cfg(test)]
    pub fn view(&self) -> &ModalView {
        &self.view
    }

    // https://api.slack.com/methods/views.open
    pub async fn send(&self, chat_client: &dyn ChatClient) -> Result<(), AppError> {
        chat_client
            .open_view(&self.trigger_id, &self.view)
            .await
            .map_err(|e| {
                let cause = e.context(format!("failed to send modal with trigger ID {}", self.trigger_id));
                AppError::internal("Failed to send modal to Slack").with_cause(cause)
            })
    }
}

// https://api.slack.com/reference/interaction-payloads/views#view_submission
#[derive(Deserialize, Debug)]
pub struct ModalPayload {
    user: PayloadUser,
    view: PayloadView,
}

#[derive(Deserialize, Debug)]
struct PayloadUser {
    #[serde(default)]
    username: String,
}

#[derive(Deserialize, Debug)]
struct PayloadView {
    state: ViewState,
}

#[derive(Deserialize, Debug)]
struct ViewState {
    #[serde(default)]
    values: BTreeMap<String, BTreeMap<String, FieldInput>>,
}

/// Submitted state of one input element.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(from = "RawFieldInput")]
pub enum FieldInput {
    StaticSelect { selected: Option<String> },
    FreeText { value: Option<String> },
}

#[derive(Deserialize)]
struct RawFieldInput {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    selected_option: Option<SelectedOption>,
}

#[derive(Deserialize)]
struct SelectedOption {
    value: String,
}

impl From<RawFieldInput> for FieldInput {
    fn from(raw: RawFieldInput) -> Self {
        if raw.kind == STATIC_SELECT {
            FieldInput::StaticSelect {
                selected: raw.selected_option.map(|o| o.value),
            }
        } else {
            FieldInput::FreeText { value: raw.value }
        }
    }
}

impl FieldInput {
    pub fn resolve(&self) -> String {
        match self {
            FieldInput::StaticSelect { selected } => selected.clone().unwrap_or_default(),
            FieldInput::FreeText { value } => value.clone().unwrap_or_default(),
        }
    }
}

impl ModalPayload {
    pub fn parse(payload: &str) -> Result<Self, AppError> {
        if payload.trim().is_empty() {
            return Err(AppError::bad_request("Invalid payload format").with_cause(anyhow!("payload is empty")));
        }
        serde_json::from_str(payload).map_err(|e| AppError::bad_request("Invalid payload format").with_cause(e))
    }

    pub fn username(&self) -> &str {
        &self.user.username
    }

    pub fn parse_field(&self, block_id: &str) -> Result<String, AppError> {
        self.view
            .state
            .values
            .get(block_id)
            .and_then(|actions| actions.values().next())
            .map(FieldInput::resolve)
            .ok_or_else(|| AppError::bad_request(format!("Field {block_id} not found")))
    }

    pub fn parse_all_fields(&self) -> Result<FieldValues, AppError> {
        let fields: FieldValues = self
            .view
            .state
            .values
            .iter()
            .filter_map(|(block_id, actions)| {
                actions.values().next().map(|input| (block_id.clone(), input.resolve()))
            })
            .collect();
        if fields.is_empty() {
            return Err(AppError::bad_request("No fields found in modal"));
        }
        Ok(fields)
    }
}
