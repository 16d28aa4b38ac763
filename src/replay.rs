//! Scripted document replays.
//!
//! Runs the meeting watcher against an in-memory document driven by a JSON
//! script, so the browser side can be exercised without a browser:
//!
//! ```json
//! { "steps": [
//!     { "op": "initialize" },
//!     { "op": "append", "name": "call", "tag": "div",
//!       "attributes": { "jsname": "CQylAd" } },
//!     { "op": "flush" },
//!     { "op": "remove", "name": "call" },
//!     { "op": "flush" }
//! ] }
//! ```
//!
//! Nodes are referred to by the name given when they were appended;
//! `body` is predefined.

use crate::dom::{Document, NodeId, Selector};
use crate::watcher::{DocumentMarker, MeetingStateWatcher, MessageSender};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Script {
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Attach the watcher and report the current state.
    Initialize,
    /// A new consumer connected.
    Trigger,
    /// Deliver pending document mutations to observers.
    Flush,
    /// Release the watcher's mutation subscription.
    Detach,
    Append {
        name: String,
        #[serde(default = "default_parent")]
        parent: String,
        #[serde(default = "default_tag")]
        tag: String,
        #[serde(default)]
        attributes: BTreeMap<String, String>,
    },
    Remove {
        name: String,
    },
    SetAttribute {
        name: String,
        attribute: String,
        value: String,
    },
    RemoveAttribute {
        name: String,
        attribute: String,
    },
}

fn default_parent() -> String {
    "body".to_string()
}

fn default_tag() -> String {
    "div".to_string()
}

impl Script {
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse replay script")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay script {:?}", path))?;
        Self::from_json(&content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub steps: usize,
    pub deliveries: usize,
    pub final_active: Option<bool>,
}

/// Play `script` against a fresh document watched for `selector`.
///
/// Sender failures abort the replay and are returned as-is.
pub fn run_script<T>(script: &Script, selector: Selector, sender: T) -> Result<ReplayReport>
where
    T: MessageSender + 'static,
{
    let document = Document::new();
    let marker = DocumentMarker::new(document.clone(), selector);
    let watcher = MeetingStateWatcher::new(marker.clone(), marker, sender);

    let mut names: HashMap<String, NodeId> = HashMap::new();
    names.insert("body".to_string(), document.body());
    let lookup = |names: &HashMap<String, NodeId>, name: &str| {
        names
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("Unknown node '{}'", name))
    };

    let mut deliveries = 0;
    for (index, step) in script.steps.iter().enumerate() {
        debug!("Replay step {}: {:?}", index + 1, step);
        let context = || format!("Replay step {} failed", index + 1);

        match step {
            Step::Initialize => watcher.initialize().with_context(context)?,
            Step::Trigger => watcher.on_external_trigger().with_context(context)?,
            Step::Flush => deliveries += document.deliver_mutations(),
            Step::Detach => {
                watcher.detach();
            }
            Step::Append {
                name,
                parent,
                tag,
                attributes,
            } => {
                if names.contains_key(name) {
                    return Err(anyhow!("Node name '{}' is already in use", name))
                        .with_context(context);
                }
                let parent = lookup(&names, parent.as_str()).with_context(context)?;
                let attributes: Vec<(&str, &str)> = attributes
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                let node = document
                    .append_element(parent, tag, &attributes)
                    .with_context(context)?;
                names.insert(name.clone(), node);
            }
            Step::Remove { name } => {
                let node = lookup(&names, name.as_str()).with_context(context)?;
                document.remove(node).with_context(context)?;
                // Children of the removed node are gone too.
                names.retain(|_, id| document.contains(*id));
            }
            Step::SetAttribute {
                name,
                attribute,
                value,
            } => {
                let node = lookup(&names, name.as_str()).with_context(context)?;
                document
                    .set_attribute(node, attribute, value)
                    .with_context(context)?;
            }
            Step::RemoveAttribute { name, attribute } => {
                let node = lookup(&names, name.as_str()).with_context(context)?;
                document
                    .remove_attribute(node, attribute)
                    .with_context(context)?;
            }
        }
    }

    Ok(ReplayReport {
        steps: script.steps.len(),
        deliveries,
        final_active: watcher.last_active(),
    })
}
