//! `/zoom` command parsing.

use crate::domain::{ChannelId, PostId, UserId};

const ACTION_CONNECT: &str = "connect";
const ACTION_START: &str = "start";
const ACTION_DISCONNECT: &str = "disconnect";
const ACTION_HELP: &str = "help";
const ACTION_SETTING: &str = "setting";
const SETTING_USE_PMI: &str = "use_pmi";

/// One invocation of the slash command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandArgs {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub root_id: Option<PostId>,
    pub command: String,
}

/// Whitespace-tokenized command line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: String,
    pub action: String,
    /// Only populated for `start`.
    pub topic: String,
    /// Tokens after the action.
    pub args: Vec<String>,
}

pub fn parse_command(raw: &str) -> ParsedCommand {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let Some((command, rest)) = tokens.split_first() else {
        return ParsedCommand::default();
    };

    let action = rest.first().copied().unwrap_or("").to_string();
    let args: Vec<String> = rest.iter().skip(1).map(|s| s.to_string()).collect();
    let topic = if action == ACTION_START {
        args.join(" ")
    } else {
        String::new()
    };

    ParsedCommand {
        command: command.to_string(),
        action,
        topic,
        args,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Connect,
    Start { topic: String },
    Disconnect,
    Help,
    Setting(SettingAction),
    Unknown(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettingAction {
    /// `/zoom setting`
    Help,
    /// `/zoom setting use_pmi [value]`
    UsePmi(Option<String>),
    Unknown(String),
}

impl ParsedCommand {
    /// Exact, case-sensitive match of the action token.
    pub fn action(&self) -> Action {
        match self.action.as_str() {
            ACTION_CONNECT => Action::Connect,
            ACTION_START => Action::Start {
                topic: self.topic.clone(),
            },
            ACTION_DISCONNECT => Action::Disconnect,
            ACTION_HELP | "" => Action::Help,
            ACTION_SETTING => Action::Setting(self.setting_action()),
            other => Action::Unknown(other.to_string()),
        }
    }

    fn setting_action(&self) -> SettingAction {
        match self.args.first().map(String::as_str) {
            None => SettingAction::Help,
            Some(SETTING_USE_PMI) => SettingAction::UsePmi(self.args.get(1).cloned()),
            Some(other) => SettingAction::Unknown(other.to_string()),
        }
    }
}
