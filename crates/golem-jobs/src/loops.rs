//! Loop dimensions and their selectable items.

use std::collections::BTreeSet;

use golem_core::{ArgList, GolemError, Result};
use serde::Serialize;

pub const DEFAULT_LOOP_SEPARATOR: &str = ",";

/// A named iteration dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loop {
    pub name: String,
    /// Ordered, unique values.
    pub values: Vec<String>,
    /// Group label → member values, in declaration order.
    pub groups: Option<Vec<(String, Vec<String>)>>,
    /// Tag under which the selected group label(s) are published.
    pub group_name: Option<String>,
    pub separator: String,
    /// Sensor loops feed the `sensors` field of flow-query descriptors.
    pub sensor: bool,
}

/// One selectable unit of a loop: a single value or a whole group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopItem {
    pub label: String,
    pub members: Vec<String>,
    pub is_group: bool,
}

impl LoopItem {
    pub fn value(value: &str) -> Self {
        Self {
            label: value.to_string(),
            members: vec![value.to_string()],
            is_group: false,
        }
    }

    pub fn group(label: &str, members: &[String]) -> Self {
        Self {
            label: label.to_string(),
            members: members.to_vec(),
            is_group: true,
        }
    }
}

impl Loop {
    pub fn new<I, S>(name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for v in values {
            let v = v.into();
            if !unique.contains(&v) {
                unique.push(v);
            }
        }
        Self {
            name: name.to_string(),
            values: unique,
            groups: None,
            group_name: None,
            separator: DEFAULT_LOOP_SEPARATOR.to_string(),
            sensor: name == "sensor",
        }
    }

    pub fn with_separator(mut self, separator: &str) -> Self {
        self.separator = separator.to_string();
        self
    }

    pub fn with_sensor(mut self, sensor: bool) -> Self {
        self.sensor = sensor;
        self
    }

    pub fn with_groups(mut self, group_name: &str, groups: Vec<(String, Vec<String>)>) -> Self {
        self.group_name = Some(group_name.to_string());
        self.groups = Some(groups);
        self
    }

    /// Group values by their leading alphabetic prefix (`LAB0`, `LAB1` → `LAB`).
    pub fn with_prefix_groups(self, group_name: &str) -> Self {
        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        for value in &self.values {
            let prefix: String = value
                .chars()
                .take_while(|c| c.is_ascii_alphabetic())
                .collect();
            let label = if prefix.is_empty() { value.clone() } else { prefix };
            match groups.iter_mut().find(|(l, _)| *l == label) {
                Some((_, members)) => members.push(value.clone()),
                None => groups.push((label, vec![value.clone()])),
            }
        }
        self.with_groups(group_name, groups)
    }

    /// Static checks run when the owning job is built.
    pub fn validate(&self) -> Result<()> {
        if self.values.is_empty() {
            return Err(GolemError::Config(format!("loop '{}' has no values", self.name)));
        }
        match (&self.groups, &self.group_name) {
            (Some(groups), Some(group_name)) => {
                if group_name == &self.name {
                    return Err(GolemError::Config(format!(
                        "loop '{}' uses its own name as group name",
                        self.name
                    )));
                }
                let mut seen = BTreeSet::new();
                for (label, members) in groups {
                    if !seen.insert(label) {
                        return Err(GolemError::Config(format!(
                            "loop '{}' declares group '{label}' twice",
                            self.name
                        )));
                    }
                    if let Some(m) = members.iter().find(|m| !self.values.contains(m)) {
                        return Err(GolemError::Config(format!(
                            "group '{label}' of loop '{}' names unknown value '{m}'",
                            self.name
                        )));
                    }
                }
            }
            (Some(_), None) => {
                return Err(GolemError::Config(format!(
                    "loop '{}' has groups but no group name",
                    self.name
                )))
            }
            _ => {}
        }
        Ok(())
    }

    pub fn group(&self, label: &str) -> Option<&[String]> {
        self.groups
            .as_ref()?
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, members)| members.as_slice())
    }

    /// Labels of every group containing `value`.
    pub fn groups_of(&self, value: &str) -> Vec<String> {
        self.groups
            .iter()
            .flatten()
            .filter(|(_, members)| members.iter().any(|m| m == value))
            .map(|(label, _)| label.clone())
            .collect()
    }

    /// Every value as its own item: the default selection.
    pub fn items(&self) -> Vec<LoopItem> {
        self.values.iter().map(|v| LoopItem::value(v)).collect()
    }

    /// Select values; a group label expands to its member values.
    pub fn select(&self, values: &[String]) -> Result<Vec<LoopItem>> {
        let mut items: Vec<LoopItem> = Vec::new();
        let mut push = |item: LoopItem| {
            if !items.contains(&item) {
                items.push(item);
            }
        };
        for value in values {
            if self.values.contains(value) {
                push(LoopItem::value(value));
            } else if let Some(members) = self.group(value) {
                for m in members {
                    push(LoopItem::value(m));
                }
            } else {
                return Err(GolemError::Parameter(format!(
                    "unknown value '{value}' for loop '{}'",
                    self.name
                )));
            }
        }
        Ok(items)
    }

    /// Select whole groups; each becomes a single item.
    pub fn select_groups(&self, labels: &[String]) -> Result<Vec<LoopItem>> {
        let mut items = Vec::new();
        for label in labels {
            let members = self.group(label).ok_or_else(|| {
                GolemError::Parameter(format!(
                    "unknown group '{label}' for loop '{}'",
                    self.name
                ))
            })?;
            let item = LoopItem::group(label, members);
            if !items.contains(&item) {
                items.push(item);
            }
        }
        Ok(items)
    }

    /// Values published under the loop name for `items`.
    pub fn value_args(&self, items: &[LoopItem]) -> ArgList {
        items
            .iter()
            .flat_map(|i| i.members.iter().cloned())
            .collect::<ArgList>()
            .with_separator(self.separator.as_str())
    }

    /// Labels published under the group name for `items`.
    pub fn group_args(&self, items: &[LoopItem]) -> ArgList {
        let mut labels = ArgList::new().with_separator(self.separator.as_str());
        for item in items {
            if item.is_group {
                labels.push(item.label.clone());
            } else {
                labels.extend(self.groups_of(&item.label));
            }
        }
        labels
    }
}
