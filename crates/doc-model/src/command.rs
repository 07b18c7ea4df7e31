use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CommandError;
use crate::model::Model;

/// Observable state a host binds its controls to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandState {
    pub value: Value,
    pub is_enabled: bool,
}

impl Default for CommandState {
    fn default() -> Self {
        Self::disabled()
    }
}

impl CommandState {
    pub fn enabled(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            is_enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            value: Value::Null,
            is_enabled: false,
        }
    }

    pub fn with_enabled(mut self, is_enabled: bool) -> Self {
        self.is_enabled = is_enabled;
        self
    }

    /// `false`, `null`, `0` and `""` count as off.
    pub fn is_on(&self) -> bool {
        is_truthy(&self.value)
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandEvent {
    ValueChanged { old: Value, new: Value },
    EnabledChanged(bool),
}

impl CommandEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CommandEvent::ValueChanged { .. } => "change:value",
            CommandEvent::EnabledChanged(_) => "change:isEnabled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Refreshing,
    Executing,
    Destroyed,
}

/// One invocable action. `refresh` derives state from the model; `execute`
/// mutates it through [`Model::change`].
pub trait Command {
    type Options: DeserializeOwned + Default;

    fn refresh(&self, model: &Model) -> CommandState;

    fn execute(
        &mut self,
        model: &mut Model,
        state: &CommandState,
        options: Self::Options,
    ) -> Result<(), CommandError>;
}

pub type Listener = Box<dyn FnMut(&CommandEvent)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Owns a command together with its observable state and subscribers.
pub struct CommandHandle<C: Command> {
    name: String,
    command: C,
    state: CommandState,
    lifecycle: Lifecycle,
    refreshed_at: Option<u64>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
    disabled_by: BTreeSet<String>,
}

impl<C: Command> CommandHandle<C> {
    pub fn new(name: impl Into<String>, command: C) -> Self {
        Self {
            name: name.into(),
            command,
            state: CommandState::disabled(),
            lifecycle: Lifecycle::Idle,
            refreshed_at: None,
            listeners: Vec::new(),
            next_subscription: 0,
            disabled_by: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &CommandState {
        &self.state
    }

    pub fn value(&self) -> &Value {
        &self.state.value
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn command(&self) -> &C {
        &self.command
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&CommandEvent) + 'static) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Keeps the command disabled until every `id` that forced it is cleared.
    pub fn force_disabled(&mut self, id: impl Into<String>, model: &Model) {
        self.disabled_by.insert(id.into());
        self.refresh(model);
    }

    pub fn clear_force_disabled(&mut self, id: &str, model: &Model) {
        self.disabled_by.remove(id);
        self.refresh(model);
    }

    pub fn refresh(&mut self, model: &Model) {
        if self.lifecycle == Lifecycle::Destroyed {
            return;
        }
        self.lifecycle = Lifecycle::Refreshing;
        let mut next = self.command.refresh(model);
        if !self.disabled_by.is_empty() {
            next.is_enabled = false;
        }
        let previous = std::mem::replace(&mut self.state, next);
        self.refreshed_at = Some(model.version());
        if previous.value != self.state.value {
            self.emit(CommandEvent::ValueChanged {
                old: previous.value,
                new: self.state.value.clone(),
            });
        }
        if previous.is_enabled != self.state.is_enabled {
            self.emit(CommandEvent::EnabledChanged(self.state.is_enabled));
        }
        self.lifecycle = Lifecycle::Idle;
    }

    fn emit(&mut self, event: CommandEvent) {
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
    }

    /// Runs the command and refreshes before returning. Destroyed and
    /// disabled commands do nothing.
    pub fn execute(&mut self, model: &mut Model, options: C::Options) -> Result<(), CommandError> {
        if self.lifecycle == Lifecycle::Destroyed {
            return Ok(());
        }
        if self.refreshed_at != Some(model.version()) {
            self.refresh(model);
        }
        if !self.state.is_enabled {
            tracing::trace!(command = %self.name, "skipping disabled command");
            return Ok(());
        }
        self.lifecycle = Lifecycle::Executing;
        let state = self.state.clone();
        let result = self.command.execute(model, &state, options);
        self.lifecycle = Lifecycle::Idle;
        match &result {
            Ok(()) => tracing::debug!(command = %self.name, "executed command"),
            Err(err) => tracing::debug!(command = %self.name, %err, "command failed"),
        }
        self.refresh(model);
        result
    }

    pub fn destroy(&mut self) {
        self.lifecycle = Lifecycle::Destroyed;
        self.listeners.clear();
    }
}

/// Name-addressable view of a [`CommandHandle`] taking JSON options.
pub trait AnyCommand {
    fn name(&self) -> &str;
    fn state(&self) -> &CommandState;
    fn lifecycle(&self) -> Lifecycle;
    fn refresh(&mut self, model: &Model);
    fn execute_json(&mut self, model: &mut Model, options: Option<Value>)
    -> Result<(), CommandError>;
    fn subscribe(&mut self, listener: Listener) -> SubscriptionId;
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;
    fn destroy(&mut self);
}

impl<C: Command> AnyCommand for CommandHandle<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> &CommandState {
        &self.state
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn refresh(&mut self, model: &Model) {
        CommandHandle::refresh(self, model);
    }

    fn execute_json(
        &mut self,
        model: &mut Model,
        options: Option<Value>,
    ) -> Result<(), CommandError> {
        let options = match options {
            None | Some(Value::Null) => C::Options::default(),
            Some(value) => {
                serde_json::from_value(value).map_err(|source| CommandError::InvalidOptions {
                    command: self.name.clone(),
                    source,
                })?
            }
        };
        self.execute(model, options)
    }

    fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        CommandHandle::subscribe(self, listener)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        CommandHandle::unsubscribe(self, id)
    }

    fn destroy(&mut self) {
        CommandHandle::destroy(self);
    }
}
