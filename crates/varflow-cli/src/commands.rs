use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use varflow_core::{
    DerivedVariableRequest, SessionSnapshot, TriggerSignal, VariableStore, build_trigger_map,
    dep_values, embed_force_key_in_values, get_deps, new_force_key, normalize_all,
    normalize_for_preload, prepare_request,
};
use varflow_model::{NormalizedPayload, Variable};
use varflow_stream::{
    LineDecoder, StreamEvent, StreamState, StreamStatus, apply_stream_event, get_stream_value,
};

use crate::cli::{NormalizeArgs, ReplayArgs, RequestArgs, SessionArgs};
use crate::config::EngineConfig;
use crate::logging::payload_preview;

/// One row of the `triggers` listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerRow {
    pub trigger_index: usize,
    pub variable_index: usize,
    pub local_index: usize,
    pub kind: String,
    pub uid: String,
}

/// Observed dependency values of one top-level variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepsRow {
    pub index: usize,
    pub kind: String,
    pub uid: String,
    pub observed: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayReport {
    pub events: usize,
    pub skipped: usize,
    /// Backoff delay a live connection would wait before each reconnect.
    pub reconnect_delays_ms: Vec<u64>,
    pub status: Option<StreamStatus>,
    pub error: Option<String>,
    pub value: Option<Value>,
}

fn load_session(args: &SessionArgs, config: &EngineConfig) -> Result<(SessionSnapshot, VariableStore)> {
    let text = std::fs::read_to_string(&args.session)
        .with_context(|| format!("read session {}", args.session.display()))?;
    let snapshot = SessionSnapshot::from_json(&text)
        .with_context(|| format!("parse session {}", args.session.display()))?;
    let store = snapshot.to_store(Some(&config.session_scope));
    debug!(
        session = store.session_scope(),
        variables = snapshot.variables.len(),
        "session loaded"
    );
    Ok((snapshot, store))
}

pub fn run_normalize(args: &NormalizeArgs, config: &EngineConfig) -> Result<NormalizedPayload> {
    let (snapshot, store) = load_session(&args.session, config)?;
    let mut payload = if args.preload {
        normalize_for_preload(&snapshot.variables, &store).context("preload normalization")?
    } else {
        normalize_all(&snapshot.variables, &store)
    };

    if let Some(trigger) = args.trigger {
        let force_key = new_force_key();
        payload.data =
            embed_force_key_in_values(&payload.data, &snapshot.variables, Some(&force_key), trigger, 0);
        info!(trigger, force_key = %force_key, "trigger applied");
    }
    Ok(payload)
}

pub fn run_request(args: &RequestArgs, config: &EngineConfig) -> Result<DerivedVariableRequest> {
    let (snapshot, store) = load_session(&args.session, config)?;
    let Some(variable) = find_variable(&snapshot.variables, &args.uid) else {
        bail!("no variable with uid '{}' in {}", args.uid, args.session.session.display());
    };
    let trigger = args.trigger.map(|index| TriggerSignal {
        force_key: args.force_key.clone().unwrap_or_else(new_force_key),
        index,
    });
    prepare_request(variable, &store, &config.ws_channel, trigger.as_ref())
        .with_context(|| format!("build request for '{}'", args.uid))
}

pub fn run_triggers(args: &SessionArgs, config: &EngineConfig) -> Result<Vec<TriggerRow>> {
    let (snapshot, _) = load_session(args, config)?;
    let map = build_trigger_map(&snapshot.variables);
    Ok(map
        .iter()
        .map(|(trigger_index, entry)| TriggerRow {
            trigger_index,
            variable_index: entry.variable_index,
            local_index: entry.index,
            kind: entry.variable.kind().to_string(),
            uid: entry.variable.uid().to_string(),
        })
        .collect())
}

pub fn run_deps(args: &SessionArgs, config: &EngineConfig) -> Result<Vec<DepsRow>> {
    let (snapshot, store) = load_session(args, config)?;
    let payload = normalize_all(&snapshot.variables, &store);
    let observed = get_deps(&dep_values(&payload));
    Ok(snapshot
        .variables
        .iter()
        .zip(observed)
        .enumerate()
        .map(|(index, (variable, observed))| DepsRow {
            index,
            kind: variable.kind().to_string(),
            uid: variable.uid().to_string(),
            observed,
        })
        .collect())
}

pub fn run_replay(args: &ReplayArgs, config: &EngineConfig) -> Result<ReplayReport> {
    let text = std::fs::read_to_string(&args.events)
        .with_context(|| format!("read events {}", args.events.display()))?;
    Ok(replay_text(&text, args.key_accessor.as_deref(), config))
}

/// Feed captured NDJSON text through the stream state machine.
pub fn replay_text(text: &str, key_accessor: Option<&str>, config: &EngineConfig) -> ReplayReport {
    let mut decoder = LineDecoder::new();
    let mut lines = decoder.push(text);
    lines.extend(decoder.finish());

    let mut state: Option<Arc<StreamState>> = None;
    let mut report = ReplayReport {
        events: 0,
        skipped: 0,
        reconnect_delays_ms: Vec::new(),
        status: None,
        error: None,
        value: None,
    };
    let mut attempt = 0u32;

    for (number, line) in lines.iter().enumerate() {
        let event = match StreamEvent::parse(line) {
            Ok(event) => event,
            Err(err) => {
                warn!(line = number + 1, error = %err, "skipping malformed event");
                report.skipped += 1;
                continue;
            }
        };
        debug!(
            line = number + 1,
            kind = event.kind(),
            payload = %event.payload().map(payload_preview).unwrap_or_default(),
            "replaying event"
        );
        if event == StreamEvent::Reconnect {
            let delay = config.stream.delay_for(attempt);
            report
                .reconnect_delays_ms
                .push(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));
            attempt = attempt.saturating_add(1);
        } else {
            attempt = 0;
        }
        state = apply_stream_event(state, &event, key_accessor);
        report.events += 1;
    }

    if let Some(state) = state.as_deref() {
        report.status = Some(state.status);
        report.error.clone_from(&state.error);
    }
    report.value = get_stream_value(state.as_deref(), key_accessor);
    report
}

fn find_variable<'a>(variables: &'a [Variable], uid: &str) -> Option<&'a Variable> {
    variables.iter().find_map(|variable| {
        if variable.uid() == uid {
            Some(variable)
        } else {
            find_variable(variable.derived_inputs(), uid)
        }
    })
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{text}");
    Ok(())
}
