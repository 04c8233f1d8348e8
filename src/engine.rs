use crate::connection::{
    ConnectionAction, ConnectionEvent, ConnectionManager, ConnectionState, RetryPolicy,
};
use crate::filter::{self, FilterCriteria, FilteredView};
use crate::log_store::{ClientRoster, LogStore};
use crate::protocol::{self, ServerMessage};
use crate::types::{ClientRequest, ClientStats, LogLevel};
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::time::Duration;

/// Transport work requested by the engine. The session driver carries these out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Open,
    Send(String),
    ScheduleRetry(Duration),
}

/// Consumer of the engine's view. Only `render` is mandatory.
pub trait PresentationSink {
    fn render(&mut self, view: &FilteredView<'_>);

    fn connection_changed(&mut self, _state: ConnectionState) {}

    fn roster_changed(&mut self, _clients: &[String]) {}

    fn scope_changed(&mut self, _scope: Option<&str>) {}

    fn stats_changed(&mut self, _stats: Option<&ClientStats>) {}
}

/// Stream ingestion and presentation engine.
///
/// Owns the connection state machine, the log store, the client roster and
/// the filter criteria. Every store or criteria change re-renders the sink.
pub struct Engine<S: PresentationSink> {
    connection: ConnectionManager,
    store: LogStore,
    roster: ClientRoster,
    criteria: FilterCriteria,
    stats: Option<ClientStats>,
    sink: S,
}

impl<S: PresentationSink> Engine<S> {
    pub fn new(sink: S, policy: RetryPolicy) -> Self {
        Self {
            connection: ConnectionManager::new(policy),
            store: LogStore::new(),
            roster: ClientRoster::new(),
            criteria: FilterCriteria::default(),
            stats: None,
            sink,
        }
    }

    pub fn with_criteria(mut self, criteria: FilterCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn start(&mut self) -> Vec<Effect> {
        self.on_connection_event(ConnectionEvent::Start)
    }

    pub fn on_connection_event(&mut self, event: ConnectionEvent) -> Vec<Effect> {
        let step = self.connection.handle(event);

        for state in &step.transitions {
            self.sink.connection_changed(*state);
        }

        let mut effects = Vec::new();
        for action in step.actions {
            match action {
                ConnectionAction::Open => effects.push(Effect::Open),
                ConnectionAction::RequestRoster => {
                    effects.extend(self.send(&ClientRequest::GetClients));
                    // Resync history for an active scope; live records may have been missed.
                    if let Some(client_id) = self.store.scope() {
                        let request = ClientRequest::GetLogs {
                            client_id: client_id.to_string(),
                        };
                        effects.extend(self.send(&request));
                    }
                }
                ConnectionAction::ScheduleRetry(delay) => {
                    effects.push(Effect::ScheduleRetry(delay));
                }
            }
        }
        effects
    }

    /// Decodes and applies one inbound text frame. Malformed frames are discarded.
    pub fn on_frame(&mut self, text: &str) {
        match protocol::decode(text) {
            Ok(message) => self.dispatch(message),
            Err(e) => warn!("Discarding malformed frame: {}", e),
        }
    }

    pub fn dispatch(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Connected {
                message,
                connection_count,
            } => {
                info!(
                    "Server says: {} (connections: {})",
                    message.as_deref().unwrap_or("connected"),
                    connection_count.map_or_else(|| "?".to_string(), |c| c.to_string())
                );
            }

            ServerMessage::ClientsList(clients) => {
                debug!("Received {} clients", clients.len());
                self.roster.replace(clients);
                self.sink.roster_changed(self.roster.clients());
            }

            ServerMessage::Log { record, client_id } => {
                if self.store.append(record, client_id.clone()).is_none() {
                    return;
                }
                if self.roster.observe(&client_id) {
                    self.sink.roster_changed(self.roster.clients());
                }
                self.refresh();
            }

            ServerMessage::LogsData { client_id, logs } => {
                if !self.response_in_scope(client_id.as_deref()) {
                    warn!(
                        "Discarding stale history for {:?} (scope {:?})",
                        client_id,
                        self.store.scope()
                    );
                    return;
                }
                info!("Loaded {} history records", logs.len());
                self.store.replace(logs, client_id.as_deref());
                self.refresh();
            }

            ServerMessage::ClientStats { client_id, stats } => {
                if !self.response_in_scope(client_id.as_deref()) {
                    warn!("Discarding stale stats for {:?}", client_id);
                    return;
                }
                self.stats = Some(stats);
                self.sink.stats_changed(self.stats.as_ref());
            }

            ServerMessage::Unknown(kind) => {
                debug!("Ignoring unknown message type: {}", kind);
            }
        }
    }

    /// Sets the client scope. A concrete scope also requests that client's history.
    pub fn set_client_scope(&mut self, scope: Option<String>) -> Vec<Effect> {
        let scope = scope.filter(|s| !s.is_empty());
        info!("Client scope: {}", scope.as_deref().unwrap_or("all clients"));

        self.store.set_scope(scope.clone());
        self.sink.scope_changed(scope.as_deref());
        self.stats = None;
        self.sink.stats_changed(None);
        self.refresh();

        match scope {
            Some(client_id) => self
                .send(&ClientRequest::GetLogs { client_id })
                .into_iter()
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn set_levels(&mut self, levels: BTreeSet<LogLevel>) {
        self.criteria.levels = levels;
        self.refresh();
    }

    pub fn toggle_level(&mut self, level: LogLevel) {
        if !self.criteria.levels.remove(&level) {
            self.criteria.levels.insert(level);
        }
        self.refresh();
    }

    pub fn set_keyword(&mut self, keyword: impl Into<String>) {
        self.criteria.keyword = keyword.into();
        self.refresh();
    }

    /// Empties the buffer. Connection and scope are left alone.
    pub fn clear(&mut self) {
        self.store.reset();
        self.refresh();
    }

    /// Restarts connecting after the reconnect budget ran out.
    pub fn retry(&mut self) -> Vec<Effect> {
        self.on_connection_event(ConnectionEvent::ManualRetry)
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn roster(&self) -> &ClientRoster {
        &self.roster
    }

    /// Encodes a request if connected. Anything else is dropped.
    fn send(&self, request: &ClientRequest) -> Option<Effect> {
        if !self.connection.is_connected() {
            debug!("Dropping {:?} while {}", request, self.connection.state());
            return None;
        }

        match protocol::encode(request) {
            Ok(text) => Some(Effect::Send(text)),
            Err(e) => {
                error!("Failed to encode {:?}: {}", request, e);
                None
            }
        }
    }

    fn response_in_scope(&self, client_id: Option<&str>) -> bool {
        match client_id {
            Some(client_id) => self.store.scope() == Some(client_id),
            None => true,
        }
    }

    fn refresh(&mut self) {
        let view = filter::apply(&self.store, &self.criteria);
        self.sink.render(&view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordingSink {
        renders: Vec<(Vec<String>, usize, usize)>,
        states: Vec<ConnectionState>,
        rosters: Vec<Vec<String>>,
        scopes: Vec<Option<String>>,
        stats: Vec<Option<ClientStats>>,
    }

    impl PresentationSink for RecordingSink {
        fn render(&mut self, view: &FilteredView<'_>) {
            let messages = view.entries.iter().map(|e| e.message().to_string()).collect();
            self.renders.push((messages, view.visible(), view.total));
        }

        fn connection_changed(&mut self, state: ConnectionState) {
            self.states.push(state);
        }

        fn roster_changed(&mut self, clients: &[String]) {
            self.rosters.push(clients.to_vec());
        }

        fn scope_changed(&mut self, scope: Option<&str>) {
            self.scopes.push(scope.map(str::to_string));
        }

        fn stats_changed(&mut self, stats: Option<&ClientStats>) {
            self.stats.push(stats.copied());
        }
    }

    fn connected_engine() -> Engine<RecordingSink> {
        let mut engine = Engine::new(RecordingSink::default(), RetryPolicy::default());
        engine.start();
        engine.on_connection_event(ConnectionEvent::Opened);
        engine
    }

    fn log_frame(client_id: &str, level: &str, message: &str) -> String {
        serde_json::json!({
            "type": "log",
            "client_id": client_id,
            "data": {
                "timestamp": "2026-01-20 12:00:02.222",
                "level": level,
                "message": message,
                "logger": "app",
                "function": "main",
                "line": 1,
                "client_id": client_id
            }
        })
        .to_string()
    }

    fn history_frame(client_id: &str, messages: &[&str]) -> String {
        let logs: Vec<_> = messages
            .iter()
            .map(|m| serde_json::json!({"level": "INFO", "message": m, "client_id": client_id}))
            .collect();
        serde_json::json!({"type": "logs_data", "client_id": client_id, "logs": logs}).to_string()
    }

    fn messages<S: PresentationSink>(engine: &Engine<S>) -> Vec<String> {
        engine.store().iter().map(|e| e.message().to_string()).collect()
    }

    #[test]
    fn opening_requests_the_roster() {
        let mut engine = Engine::new(RecordingSink::default(), RetryPolicy::default());
        assert_eq!(engine.start(), vec![Effect::Open]);

        let effects = engine.on_connection_event(ConnectionEvent::Opened);
        assert_eq!(effects, vec![Effect::Send(r#"{"type":"get_clients"}"#.to_string())]);
        assert_eq!(
            engine.sink.states,
            vec![ConnectionState::Connecting, ConnectionState::Connected]
        );
    }

    #[test]
    fn live_logs_are_prepended_and_extend_the_roster() {
        let mut engine = connected_engine();
        engine.on_frame(r#"{"type":"clients_list","clients":["a"]}"#);
        engine.on_frame(&log_frame("a", "INFO", "first"));
        engine.on_frame(&log_frame("b", "INFO", "second"));

        assert_eq!(messages(&engine), vec!["second", "first"]);
        assert_eq!(engine.roster().clients(), ["a", "b"]);
        assert_eq!(
            engine.sink.rosters,
            vec![vec!["a".to_string()], vec!["a".to_string(), "b".to_string()]]
        );
        let (_, visible, total) = engine.sink.renders.last().unwrap();
        assert_eq!((*visible, *total), (2, 2));
    }

    #[test]
    fn malformed_frame_does_not_block_the_next_one() {
        let mut engine = connected_engine();
        engine.on_frame("{{ definitely not json");
        engine.on_frame(&log_frame("a", "ERROR", "boom"));

        assert_eq!(messages(&engine), vec!["boom"]);
        assert_eq!(engine.state(), ConnectionState::Connected);
    }

    #[test]
    fn scoping_clears_requests_history_and_drops_other_clients() {
        let mut engine = connected_engine();
        engine.on_frame(&log_frame("a", "INFO", "old"));

        let effects = engine.set_client_scope(Some("a".to_string()));
        assert_eq!(
            effects,
            vec![Effect::Send(
                r#"{"type":"get_logs","client_id":"a"}"#.to_string()
            )]
        );
        assert!(engine.store().is_empty());

        engine.on_frame(&history_frame("a", &["r1", "r2", "r3"]));
        assert_eq!(messages(&engine), vec!["r3", "r2", "r1"]);

        engine.on_frame(&log_frame("b", "INFO", "foreign"));
        engine.on_frame(&log_frame("a", "INFO", "live"));
        assert_eq!(messages(&engine), vec!["live", "r3", "r2", "r1"]);
        assert!(engine.store().iter().all(|e| e.client_id == "a"));
        assert!(!engine.roster().contains("b"));
    }

    #[test]
    fn history_ids_are_distinct_and_increasing_newest_first() {
        let mut engine = connected_engine();
        engine.set_client_scope(Some("a".to_string()));
        engine.on_frame(&history_frame("a", &["r1", "r2", "r3"]));

        let ids: Vec<u64> = engine.store().iter().map(|e| e.id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "{:?}", ids);
    }

    #[test]
    fn stale_history_for_previous_scope_is_discarded() {
        let mut engine = connected_engine();
        engine.set_client_scope(Some("a".to_string()));
        engine.set_client_scope(Some("b".to_string()));

        engine.on_frame(&history_frame("a", &["stale"]));
        assert!(engine.store().is_empty());

        engine.on_frame(&history_frame("b", &["fresh"]));
        assert_eq!(messages(&engine), vec!["fresh"]);
    }

    #[test]
    fn clearing_scope_empties_without_request() {
        let mut engine = connected_engine();
        engine.set_client_scope(Some("a".to_string()));
        engine.on_frame(&history_frame("a", &["r1"]));

        assert!(engine.set_client_scope(None).is_empty());
        assert!(engine.store().is_empty());
        assert_eq!(engine.store().scope(), None);

        engine.on_frame(&log_frame("z", "INFO", "any"));
        assert_eq!(messages(&engine), vec!["any"]);
    }

    #[test]
    fn stats_are_sideband_only() {
        let mut engine = connected_engine();
        engine.set_client_scope(Some("a".to_string()));
        engine.on_frame(&history_frame("a", &["r1"]));
        let renders = engine.sink.renders.len();

        engine.on_frame(
            r#"{"type":"client_stats","client_id":"a","stats":{"total":1,"INFO":1}}"#,
        );

        assert_eq!(engine.stats.map(|s| s.total), Some(1));
        assert!(matches!(engine.sink.stats.last(), Some(Some(s)) if s.info == 1));
        assert_eq!(engine.sink.renders.len(), renders);
        assert_eq!(messages(&engine), vec!["r1"]);
    }

    #[test]
    fn changing_scope_clears_stats_and_reports_scope() {
        let mut engine = connected_engine();
        engine.set_client_scope(Some("a".to_string()));
        engine.on_frame(r#"{"type":"client_stats","client_id":"a","stats":{"total":4}}"#);
        assert!(engine.stats.is_some());

        engine.set_client_scope(Some("b".to_string()));
        assert_eq!(engine.stats, None);
        assert_eq!(engine.sink.stats.last(), Some(&None));

        engine.set_client_scope(None);
        assert_eq!(
            engine.sink.scopes,
            vec![Some("a".to_string()), Some("b".to_string()), None]
        );
    }

    #[test]
    fn records_with_null_fields_are_kept() {
        let mut engine = connected_engine();
        engine.on_frame(
            r#"{"type":"log","client_id":"a","data":{"timestamp":null,"level":null,"message":"live"}}"#,
        );
        assert_eq!(messages(&engine), vec!["live"]);

        engine.set_client_scope(Some("a".to_string()));
        engine.on_frame(
            r#"{"type":"logs_data","client_id":"a","logs":[
                {"timestamp":"2026-01-20 12:00:00","message":"r1"},
                {"timestamp":null,"logger":null,"message":"r2"},
                {"timestamp":1700000000000,"message":"r3"}
            ]}"#,
        );
        assert_eq!(messages(&engine), vec!["r3", "r2", "r1"]);
        assert!(engine.store().iter().all(|e| e.level() == LogLevel::Info));
    }

    #[test]
    fn filters_rerender_without_touching_the_store() {
        let mut engine = connected_engine();
        engine.on_frame(&log_frame("a", "DEBUG", "connect timeout"));
        engine.on_frame(&log_frame("a", "INFO", "ready"));

        engine.set_keyword("TIMEOUT");
        let (visible, _, total) = engine.sink.renders.last().unwrap().clone();
        assert_eq!(visible, vec!["connect timeout".to_string()]);
        assert_eq!(total, 2);

        engine.toggle_level(LogLevel::Debug);
        assert_eq!(filter::apply(&engine.store, &engine.criteria).visible(), 0);

        engine.toggle_level(LogLevel::Debug);
        engine.set_keyword("");
        assert_eq!(filter::apply(&engine.store, &engine.criteria).visible(), 2);
        assert_eq!(engine.store().len(), 2);
    }

    #[test]
    fn sends_are_dropped_while_disconnected() {
        let mut engine = Engine::new(RecordingSink::default(), RetryPolicy::default());
        engine.start();

        assert!(engine.set_client_scope(Some("a".to_string())).is_empty());
        assert_eq!(engine.store().scope(), Some("a"));
    }

    #[test]
    fn connecting_with_a_scope_requests_its_history() {
        let mut engine = Engine::new(RecordingSink::default(), RetryPolicy::default());
        engine.set_client_scope(Some("a".to_string()));
        engine.start();

        let effects = engine.on_connection_event(ConnectionEvent::Opened);
        assert_eq!(
            effects,
            vec![
                Effect::Send(r#"{"type":"get_clients"}"#.to_string()),
                Effect::Send(r#"{"type":"get_logs","client_id":"a"}"#.to_string()),
            ]
        );
    }

    #[test]
    fn disconnect_keeps_buffer_and_roster() {
        let mut engine = connected_engine();
        engine.on_frame(&log_frame("a", "INFO", "kept"));

        let effects = engine.on_connection_event(ConnectionEvent::Closed);
        assert_eq!(effects, vec![Effect::ScheduleRetry(Duration::from_millis(3000))]);
        assert_eq!(messages(&engine), vec!["kept"]);
        assert!(engine.roster().contains("a"));
    }

    #[test]
    fn clear_keeps_scope() {
        let mut engine = connected_engine();
        engine.set_client_scope(Some("a".to_string()));
        engine.on_frame(&history_frame("a", &["r1"]));

        engine.clear();
        assert!(engine.store().is_empty());
        assert_eq!(engine.store().scope(), Some("a"));
        assert_eq!(engine.state(), ConnectionState::Connected);
    }
}
