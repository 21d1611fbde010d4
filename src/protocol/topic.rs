// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic layout.
//!
//! ```text
//! [base/]{device}/$state                          health state
//! [base/]{device}/{node}/{property}               property value
//! [base/]{device}/{node}/{property}/set           inbound command
//! [base/]{device}/{node}/{property}/$meta/{key}/$value
//! ```
//!
//! The base prefix is empty by default, so state topics are exactly
//! `{device}/{node}/{property}`.

use crate::registry::PropertyPath;

/// Suffix of inbound command topics.
pub const SET_SUFFIX: &str = "set";

/// Builds and parses topics for one bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicLayout {
    base: String,
}

/// Target of an inbound command topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetTarget<'a> {
    /// Device id.
    pub device: &'a str,
    /// Node id.
    pub node: &'a str,
    /// Property id.
    pub property: &'a str,
}

impl TopicLayout {
    /// Layout without a base prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Layout with a base prefix such as `homie`. Surrounding slashes are
    /// ignored; an empty prefix means none.
    #[must_use]
    pub fn with_base(base: impl AsRef<str>) -> Self {
        Self {
            base: base.as_ref().trim_matches('/').to_string(),
        }
    }

    /// The base prefix, empty if none.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    fn join(&self, rest: &str) -> String {
        if self.base.is_empty() {
            rest.to_string()
        } else {
            format!("{}/{rest}", self.base)
        }
    }

    /// `[base/]{device}/{attribute}`, e.g. `d1/$state`.
    #[must_use]
    pub fn device_attribute(&self, device: &str, attribute: &str) -> String {
        self.join(&format!("{device}/{attribute}"))
    }

    /// `[base/]{device}/{node}/{attribute}`.
    #[must_use]
    pub fn node_attribute(&self, device: &str, node: &str, attribute: &str) -> String {
        self.join(&format!("{device}/{node}/{attribute}"))
    }

    /// `[base/]{device}/{node}/{property}`.
    #[must_use]
    pub fn property(&self, path: &PropertyPath) -> String {
        self.join(&path.to_string())
    }

    /// `[base/]{device}/{node}/{property}/{attribute}`.
    #[must_use]
    pub fn property_attribute(&self, path: &PropertyPath, attribute: &str) -> String {
        self.join(&format!("{path}/{attribute}"))
    }

    /// `[base/]{device}/{node}/{property}/set`.
    #[must_use]
    pub fn set_topic(&self, path: &PropertyPath) -> String {
        self.property_attribute(path, SET_SUFFIX)
    }

    /// Subscription filter matching every command topic.
    #[must_use]
    pub fn set_filter(&self) -> String {
        self.join(&format!("+/+/+/{SET_SUFFIX}"))
    }

    /// Parses an inbound command topic.
    ///
    /// Returns `None` for anything that is not exactly
    /// `[base/]{device}/{node}/{property}/set`.
    #[must_use]
    pub fn parse_set<'a>(&self, topic: &'a str) -> Option<SetTarget<'a>> {
        let rest = if self.base.is_empty() {
            topic
        } else {
            topic.strip_prefix(&self.base)?.strip_prefix('/')?
        };

        let parts: Vec<&str> = rest.split('/').collect();
        match *parts.as_slice() {
            [device, node, property, SET_SUFFIX]
                if !device.is_empty() && !node.is_empty() && !property.is_empty() =>
            {
                Some(SetTarget {
                    device,
                    node,
                    property,
                })
            }
            _ => None,
        }
    }
}
