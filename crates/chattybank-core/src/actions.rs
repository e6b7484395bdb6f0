//! Action tags emitted by the dialog service and what they trigger.

use chattybank_config::ActionConfig;
use std::collections::HashMap;

pub const CHECK_BALANCE_TAG: &str = "check_balance";
pub const END_CONVERSATION_TAG: &str = "end_conversation";

const DEFAULT_LOOKUPS: &[(&str, &str)] = &[
    (
        "mobile_insurance",
        "?filter[where][type][regexp]=/Current%20Account/i&[filter][where][mobile_insurance]=true&filter[limit]=1",
    ),
    (
        "interest",
        "?filter[where][type][regexp]=/Current%20Account/i&filter[where][interest%20rate][gt]=1&filter[limit]=1",
    ),
    (
        "cashback",
        "?filter[where][type][regexp]=/Current%20Account/i&filter[where][cashback]=true&filter[limit]=1",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Fetch the first matching product for `query` and show it as an offer.
    Lookup { query: String },
    ShowBalance,
    EndConversation,
}

#[derive(Debug, Clone)]
pub struct ActionTable {
    entries: HashMap<String, ActionKind>,
}

impl ActionTable {
    /// Built-in lookups plus the two sentinels, extended (or overridden) by
    /// configured lookup actions.
    pub fn new(extra: &[ActionConfig]) -> Self {
        let mut entries: HashMap<String, ActionKind> = DEFAULT_LOOKUPS
            .iter()
            .map(|(tag, query)| {
                (
                    tag.to_string(),
                    ActionKind::Lookup {
                        query: query.to_string(),
                    },
                )
            })
            .collect();
        entries.insert(CHECK_BALANCE_TAG.to_string(), ActionKind::ShowBalance);
        entries.insert(END_CONVERSATION_TAG.to_string(), ActionKind::EndConversation);

        for action in extra {
            entries.insert(
                action.tag.trim().to_string(),
                ActionKind::Lookup {
                    query: action.query.clone(),
                },
            );
        }

        Self { entries }
    }

    pub fn resolve(&self, tag: &str) -> Option<&ActionKind> {
        self.entries.get(tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ActionTable {
    fn default() -> Self {
        Self::new(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::{ActionKind, ActionTable};
    use chattybank_config::ActionConfig;

    #[test]
    fn defaults_cover_lookups_and_sentinels() {
        let table = ActionTable::default();
        assert_eq!(table.len(), 5);
        assert_eq!(table.resolve("check_balance"), Some(&ActionKind::ShowBalance));
        assert_eq!(
            table.resolve("end_conversation"),
            Some(&ActionKind::EndConversation)
        );
        match table.resolve("cashback") {
            Some(ActionKind::Lookup { query }) => {
                assert!(query.contains("filter[where][cashback]=true"));
                assert!(query.ends_with("filter[limit]=1"));
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_resolves_to_none() {
        assert!(ActionTable::default().resolve("transfer_money").is_none());
    }

    #[test]
    fn configured_actions_extend_and_override_lookups() {
        let table = ActionTable::new(&[
            ActionConfig {
                tag: "overdraft".to_string(),
                query: "?filter[where][overdraft]=true".to_string(),
            },
            ActionConfig {
                tag: "interest".to_string(),
                query: "?filter[limit]=2".to_string(),
            },
        ]);
        assert_eq!(
            table.resolve("overdraft"),
            Some(&ActionKind::Lookup {
                query: "?filter[where][overdraft]=true".to_string()
            })
        );
        assert_eq!(
            table.resolve("interest"),
            Some(&ActionKind::Lookup {
                query: "?filter[limit]=2".to_string()
            })
        );
    }
}
