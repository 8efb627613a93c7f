//! Menu commands registered by running scripts, tracked per tab.
//!
//! Entries only live as long as the page that registered them, so the
//! registry is in-memory and a tab's entries are dropped on navigation.

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::types::bridge::MenuCommand;
use crate::types::injection::{FrameTarget, TabId};

#[derive(Default)]
pub struct MenuCommandRegistry {
    by_tab: RwLock<HashMap<TabId, Vec<MenuCommand>>>,
}

impl MenuCommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command and returns its id.
    pub fn register(
        &self,
        target: FrameTarget,
        script_id: &str,
        caption: &str,
        access_key: Option<String>,
    ) -> String {
        self.register_as(target, script_id, "", caption, access_key)
    }

    /// Registers a command under `command_id` and returns the id actually used.
    ///
    /// Re-registering an id the same script owns updates that entry in place.
    /// An empty id, or one another script owns in this tab, gets a fresh id.
    pub fn register_as(
        &self,
        target: FrameTarget,
        script_id: &str,
        command_id: &str,
        caption: &str,
        access_key: Option<String>,
    ) -> String {
        let mut by_tab = self.by_tab.write().unwrap_or_else(|p| p.into_inner());
        let commands = by_tab.entry(target.tab_id).or_default();

        if !command_id.is_empty() {
            match commands.iter().position(|c| c.id == command_id) {
                Some(i) if commands[i].script_id == script_id => {
                    let existing = &mut commands[i];
                    existing.caption = caption.to_string();
                    existing.access_key = access_key;
                    existing.target = target;
                    return command_id.to_string();
                }
                Some(_) => {}
                None => {
                    commands.push(MenuCommand {
                        id: command_id.to_string(),
                        script_id: script_id.to_string(),
                        caption: caption.to_string(),
                        access_key,
                        target,
                    });
                    return command_id.to_string();
                }
            }
        }

        let id = Uuid::new_v4().to_string();
        commands.push(MenuCommand {
            id: id.clone(),
            script_id: script_id.to_string(),
            caption: caption.to_string(),
            access_key,
            target,
        });
        id
    }

    /// Removes a command. Only the registering script may remove it.
    pub fn unregister(&self, tab_id: TabId, script_id: &str, command_id: &str) -> bool {
        let mut by_tab = self.by_tab.write().unwrap_or_else(|p| p.into_inner());
        let Some(commands) = by_tab.get_mut(&tab_id) else {
            return false;
        };
        let before = commands.len();
        commands.retain(|c| !(c.id == command_id && c.script_id == script_id));
        before != commands.len()
    }

    pub fn get(&self, tab_id: TabId, command_id: &str) -> Option<MenuCommand> {
        let by_tab = self.by_tab.read().unwrap_or_else(|p| p.into_inner());
        by_tab
            .get(&tab_id)
            .and_then(|commands| commands.iter().find(|c| c.id == command_id).cloned())
    }

    /// Commands of a tab in registration order.
    pub fn list(&self, tab_id: TabId) -> Vec<MenuCommand> {
        let by_tab = self.by_tab.read().unwrap_or_else(|p| p.into_inner());
        by_tab.get(&tab_id).cloned().unwrap_or_default()
    }

    pub fn clear_tab(&self, tab_id: TabId) {
        self.by_tab.write().unwrap_or_else(|p| p.into_inner()).remove(&tab_id);
    }

    /// Drops every command a removed script registered.
    pub fn remove_script(&self, script_id: &str) {
        let mut by_tab = self.by_tab.write().unwrap_or_else(|p| p.into_inner());
        for commands in by_tab.values_mut() {
            commands.retain(|c| c.script_id != script_id);
        }
        by_tab.retain(|_, commands| !commands.is_empty());
    }

    pub fn clear(&self) {
        self.by_tab.write().unwrap_or_else(|p| p.into_inner()).clear();
    }
}
