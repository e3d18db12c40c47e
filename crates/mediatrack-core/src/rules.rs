//! Table-driven rule engine
//!
//! A [`Rule`] binds a [`RuleName`] to an ordered list of predicates and an
//! ordered list of actions:
//! - predicates run first and short-circuit, the first one whose result
//!   differs from its expected value rejects the rule with its message
//! - the enter hook runs once the predicates pass
//! - actions run in order, an action returning `false` stops the remaining
//!   actions; earlier mutations are kept
//! - the exit hook runs after all actions succeeded
//!
//! The engine is generic over the state it guards so that predicates and
//! actions are plain function pointers bound when the table is built.

use crate::types::{AdBreakInfo, AdInfo, ChapterInfo, MediaInfo, Metadata, Params, QoEInfo, StateInfo};
use crate::keys::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Response message when no rule is registered for a name
pub const RULE_NOT_FOUND: &str = "Matching rule not found";

/// Symbolic rule identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleName {
    MediaStart,
    MediaComplete,
    MediaSkip,
    AdBreakStart,
    AdBreakComplete,
    AdStart,
    AdComplete,
    AdSkip,
    ChapterStart,
    ChapterComplete,
    ChapterSkip,
    Play,
    Pause,
    SeekStart,
    SeekComplete,
    BufferStart,
    BufferComplete,
    BitrateChange,
    Error,
    QoEUpdate,
    PlayheadUpdate,
    StateStart,
    StateEnd,
}

impl std::fmt::Display for RuleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Outcome of processing one rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResponse {
    pub valid: bool,
    pub message: String,
}

impl RuleResponse {
    pub fn ok() -> Self {
        Self {
            valid: true,
            message: String::new(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
        }
    }
}

/// Typed view of one tracked event, built once per `track` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleContext {
    /// Event timestamp in milliseconds
    pub timestamp: i64,
    /// Caller-side session id
    pub session_id: Option<String>,
    /// Untyped event payload
    pub params: Option<Params>,
    /// Cleaned metadata
    pub metadata: Option<Metadata>,
}

impl RuleContext {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            ..Default::default()
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn media_info(&self) -> Option<MediaInfo> {
        self.params.as_ref().and_then(MediaInfo::from_params)
    }

    pub fn ad_break_info(&self) -> Option<AdBreakInfo> {
        self.params.as_ref().and_then(AdBreakInfo::from_params)
    }

    pub fn ad_info(&self) -> Option<AdInfo> {
        self.params.as_ref().and_then(AdInfo::from_params)
    }

    pub fn chapter_info(&self) -> Option<ChapterInfo> {
        self.params.as_ref().and_then(ChapterInfo::from_params)
    }

    pub fn qoe_info(&self) -> Option<QoEInfo> {
        self.params.as_ref().and_then(QoEInfo::from_params)
    }

    pub fn state_info(&self) -> Option<StateInfo> {
        self.params.as_ref().and_then(StateInfo::from_params)
    }

    pub fn error_id(&self) -> Option<&str> {
        self.params
            .as_ref()
            .and_then(|p| p.get(info::ERROR_ID))
            .and_then(Value::as_str)
    }

    pub fn playhead(&self) -> Option<f64> {
        self.params
            .as_ref()
            .and_then(|p| p.get(info::PLAYHEAD))
            .and_then(Value::as_f64)
    }
}

/// Side-effect free gate over the guarded state and the event
pub type Predicate<S> = fn(&S, &RuleContext) -> bool;

/// State mutation, `false` stops the remaining actions
pub type Action<S> = fn(&mut S, &RuleContext) -> bool;

/// Enter/exit hook, receives the rule being processed
pub type Hook<S> = fn(&mut S, RuleName, &RuleContext) -> bool;

struct PredicateEntry<S> {
    check: Predicate<S>,
    expected: bool,
    message: &'static str,
}

/// One declarative rule
pub struct Rule<S> {
    name: RuleName,
    description: &'static str,
    predicates: Vec<PredicateEntry<S>>,
    actions: Vec<Action<S>>,
}

impl<S> Rule<S> {
    pub fn new(name: RuleName, description: &'static str) -> Self {
        Self {
            name,
            description,
            predicates: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn predicate(mut self, check: Predicate<S>, expected: bool, message: &'static str) -> Self {
        self.predicates.push(PredicateEntry {
            check,
            expected,
            message,
        });
        self
    }

    pub fn action(mut self, action: Action<S>) -> Self {
        self.actions.push(action);
        self
    }

    pub fn name(&self) -> RuleName {
        self.name
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    fn check_predicates(&self, state: &S, context: &RuleContext) -> RuleResponse {
        for entry in &self.predicates {
            if (entry.check)(state, context) != entry.expected {
                return RuleResponse::invalid(entry.message);
            }
        }
        RuleResponse::ok()
    }

    fn run_actions(&self, state: &mut S, context: &RuleContext) -> bool {
        self.actions.iter().all(|action| action(state, context))
    }
}

/// Rule table with global enter/exit hooks
pub struct RuleEngine<S> {
    rules: HashMap<RuleName, Rule<S>>,
    enter_hook: Option<Hook<S>>,
    exit_hook: Option<Hook<S>>,
}

impl<S> Default for RuleEngine<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> RuleEngine<S> {
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
            enter_hook: None,
            exit_hook: None,
        }
    }

    pub fn add_rule(&mut self, rule: Rule<S>) {
        self.rules.insert(rule.name, rule);
    }

    pub fn on_enter(&mut self, hook: Hook<S>) {
        self.enter_hook = Some(hook);
    }

    pub fn on_exit(&mut self, hook: Hook<S>) {
        self.exit_hook = Some(hook);
    }

    pub fn rule(&self, name: RuleName) -> Option<&Rule<S>> {
        self.rules.get(&name)
    }

    /// Validate and apply one rule against `state`
    ///
    /// The response reflects the predicates only. A failing action or exit
    /// hook stops processing but the rule is still reported valid.
    pub fn process(&self, state: &mut S, name: RuleName, context: &RuleContext) -> RuleResponse {
        let Some(rule) = self.rules.get(&name) else {
            return RuleResponse::invalid(RULE_NOT_FOUND);
        };

        let response = rule.check_predicates(state, context);
        if !response.valid {
            return response;
        }

        if let Some(enter) = self.enter_hook {
            if !enter(state, name, context) {
                return response;
            }
        }

        if !rule.run_actions(state, context) {
            return response;
        }

        if let Some(exit) = self.exit_hook {
            exit(state, name, context);
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        value: i32,
        log: Vec<&'static str>,
    }

    fn is_positive(s: &Counter, _: &RuleContext) -> bool {
        s.value > 0
    }

    fn is_even(s: &Counter, _: &RuleContext) -> bool {
        s.value % 2 == 0
    }

    fn increment(s: &mut Counter, _: &RuleContext) -> bool {
        s.value += 1;
        s.log.push("increment");
        true
    }

    fn stop(s: &mut Counter, _: &RuleContext) -> bool {
        s.log.push("stop");
        false
    }

    fn enter(s: &mut Counter, _: RuleName, _: &RuleContext) -> bool {
        s.log.push("enter");
        true
    }

    fn exit(s: &mut Counter, _: RuleName, _: &RuleContext) -> bool {
        s.log.push("exit");
        true
    }

    fn engine() -> RuleEngine<Counter> {
        let mut engine = RuleEngine::new();
        engine.on_enter(enter);
        engine.on_exit(exit);
        engine.add_rule(
            Rule::new(RuleName::Play, "play")
                .predicate(is_positive, true, "not positive")
                .predicate(is_even, true, "not even")
                .action(increment),
        );
        engine.add_rule(
            Rule::new(RuleName::Pause, "pause")
                .action(increment)
                .action(stop)
                .action(increment),
        );
        engine
    }

    #[test]
    fn test_unknown_rule() {
        let engine = engine();
        let mut state = Counter::default();
        let response = engine.process(&mut state, RuleName::SeekStart, &RuleContext::new(0));
        assert!(!response.valid);
        assert_eq!(response.message, RULE_NOT_FOUND);
        assert!(state.log.is_empty());
    }

    #[test]
    fn test_first_failing_predicate_wins() {
        let engine = engine();
        let mut state = Counter { value: -1, ..Default::default() };
        let response = engine.process(&mut state, RuleName::Play, &RuleContext::new(0));
        assert_eq!(response, RuleResponse::invalid("not positive"));

        state.value = 3;
        let response = engine.process(&mut state, RuleName::Play, &RuleContext::new(0));
        assert_eq!(response, RuleResponse::invalid("not even"));
        assert!(state.log.is_empty());
    }

    #[test]
    fn test_hooks_wrap_actions() {
        let engine = engine();
        let mut state = Counter { value: 2, ..Default::default() };
        let response = engine.process(&mut state, RuleName::Play, &RuleContext::new(0));
        assert!(response.valid);
        assert_eq!(state.value, 3);
        assert_eq!(state.log, vec!["enter", "increment", "exit"]);
    }

    #[test]
    fn test_failing_action_keeps_partial_mutation() {
        let engine = engine();
        let mut state = Counter::default();
        let response = engine.process(&mut state, RuleName::Pause, &RuleContext::new(0));
        assert!(response.valid);
        assert_eq!(state.value, 1);
        assert_eq!(state.log, vec!["enter", "increment", "stop"]);
    }

    #[test]
    fn test_context_accessors() {
        let mut params = Params::new();
        params.insert("time.playhead".into(), serde_json::json!(12.5));
        params.insert("error.id".into(), serde_json::json!("E42"));
        let ctx = RuleContext::new(5).with_params(params).with_session_id("s1");
        assert_eq!(ctx.playhead(), Some(12.5));
        assert_eq!(ctx.error_id(), Some("E42"));
        assert_eq!(ctx.session_id.as_deref(), Some("s1"));
        assert!(ctx.media_info().is_none());
    }
}
