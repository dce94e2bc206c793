//! Write-ahead recovery of unsaved mutations.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::error::{CenError, CenResult};
use crate::listeners::NetworkListener;
use crate::network::{ContextualEgoNetwork, WeakNetwork};
use crate::serialization::AnyRef;
use crate::types::{ContextRef, EdgeRef, Interaction, NodeRef};

/// Field separator of the journal grammar. No journaled field may contain it.
const SEPARATOR: &str = " @@ ";

#[derive(Default)]
struct RecoveryState {
    network: Option<WeakNetwork>,
    writer: Option<File>,
}

/// A [`NetworkListener`] that safeguards the network against terminating
/// without a final `save`.
///
/// Every structural mutation appends one line to an append-only journal
/// (`recovery.log` by default, co-located with the storage root) and flushes
/// it before control returns. On [`init`](NetworkListener::init) — attach the
/// listener immediately after
/// [`create_or_load`](ContextualEgoNetwork::create_or_load), before any
/// query — an existing journal is replayed against the loaded network:
/// lines are grouped by context, each group is truncated at its last
/// `context.save` entry (everything before it was already persisted), and
/// the remaining suffix is applied in order. The network is then saved and a
/// fresh journal is opened.
///
/// Replay errors are logged and do not halt startup. A listener instance
/// binds to exactly one network.
pub struct RecoveryListener {
    state: Mutex<RecoveryState>,
}

impl RecoveryListener {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RecoveryState::default()),
        }
    }

    fn write(&self, line: String) {
        let mut state = self.state.lock();
        if let Some(writer) = state.writer.as_mut() {
            if let Err(err) = writeln!(writer, "{line}").and_then(|_| writer.flush()) {
                warn!(error = %err, "failed to append to the recovery journal");
            }
        }
    }

    fn network(&self) -> Option<ContextualEgoNetwork> {
        self.state.lock().network.as_ref().and_then(WeakNetwork::upgrade)
    }

    /// Replays the journal at `path` against the loaded network.
    fn recover(&self, path: &Path, network: &ContextualEgoNetwork) -> CenResult<()> {
        if !path.exists() {
            return Ok(());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|err| CenError::Storage(err.into()))?;

        let mut groups: BTreeMap<String, Vec<&str>> = BTreeMap::new();
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split(SEPARATOR);
            let tag = fields.next();
            match (tag, fields.next()) {
                (Some(_), Some(context_id)) => {
                    groups.entry(context_id.to_string()).or_default().push(line)
                }
                _ => warn!(line, "skipped malformed journal line"),
            }
        }

        for (context_id, lines) in groups {
            let Some(context) = network.get_context_by_serialization_id(&context_id)? else {
                warn!(context = %context_id, "journal references an unknown context");
                continue;
            };
            // everything before the last save is already on disk
            let mut active: Vec<&str> = Vec::new();
            for line in lines {
                if line.starts_with("context.save") {
                    active.clear();
                }
                active.push(line);
            }
            let replayed = active.len();
            for line in active {
                if let Err(err) = Self::apply(network, &context, line) {
                    warn!(line, error = %err, "failed to replay journal line");
                }
            }
            debug!(context = %context_id, lines = replayed, "replayed journal suffix");
        }
        Ok(())
    }

    fn field<'a>(fields: &[&'a str], index: usize) -> CenResult<&'a str> {
        fields.get(index).copied().ok_or_else(|| {
            CenError::Decode(format!("journal line is missing field {index}"))
        })
    }

    fn apply(network: &ContextualEgoNetwork, context: &ContextRef, line: &str) -> CenResult<()> {
        let fields: Vec<&str> = line.splitn(7, SEPARATOR).collect();
        match Self::field(&fields, 0)? {
            "context.save" => Ok(()),
            "context.addNode" => {
                let node = network.get_or_create_node(Self::field(&fields, 2)?, None)?;
                context.add_node(&node)
            }
            "context.removeNode" => {
                let node = network.get_or_create_node(Self::field(&fields, 2)?, None)?;
                context.remove_node(&node)
            }
            "context.createEdge" => {
                let src = network.get_or_create_node(Self::field(&fields, 2)?, None)?;
                let dst = network.get_or_create_node(Self::field(&fields, 3)?, None)?;
                context.add_edge(&src, &dst).map(|_| ())
            }
            "context.removeEdge" => {
                let src = network.get_or_create_node(Self::field(&fields, 2)?, None)?;
                let dst = network.get_or_create_node(Self::field(&fields, 3)?, None)?;
                context.remove_edge(&src, &dst).map(|_| ())
            }
            "edge.createInteraction" => {
                let src = network.get_or_create_node(Self::field(&fields, 2)?, None)?;
                let dst = network.get_or_create_node(Self::field(&fields, 3)?, None)?;
                let start_time: i64 = Self::field(&fields, 4)?
                    .parse()
                    .map_err(|_| CenError::Decode("malformed start time".to_string()))?;
                let duration: i64 = Self::field(&fields, 5)?
                    .parse()
                    .map_err(|_| CenError::Decode("malformed duration".to_string()))?;
                let data = network
                    .serializer()
                    .payload_from_string(Self::field(&fields, 6)?)?;
                let edge = context.get_edge(&src, &dst)?.ok_or_else(|| {
                    CenError::Decode("journaled interaction on a missing edge".to_string())
                })?;
                edge.add_interaction(start_time, duration, data).map(|_| ())
            }
            other => Err(CenError::Decode(format!("unknown journal action '{other}'"))),
        }
    }
}

impl Default for RecoveryListener {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkListener for RecoveryListener {
    fn init(&self, network: &ContextualEgoNetwork) {
        let first_init = {
            let mut state = self.state.lock();
            if let Some(existing) = &state.network {
                if !existing.is(network) {
                    error!("a RecoveryListener can be assigned to only one network");
                    return;
                }
            }
            state.network = Some(network.downgrade());
            state.writer.take().is_none()
        };

        let path = match network
            .serializer()
            .storage()
            .path_of(&network.config().journal_file)
        {
            Ok(path) => path,
            Err(err) => {
                warn!(error = %err, "storage has no journal location; recovery disabled");
                return;
            }
        };

        if first_init {
            if let Err(err) = self.recover(&path, network) {
                warn!(error = %err, "journal replay failed");
            }
        }
        if let Err(err) = network.save() {
            warn!(error = %err, "failed to save the recovered network");
        }
        // a fresh journal: the state just saved needs no replay
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
        {
            Ok(file) => self.state.lock().writer = Some(file),
            Err(err) => warn!(error = %err, "failed to open the recovery journal"),
        }
    }

    fn on_create_node(&self, node: &NodeRef) {
        if let Some(network) = self.network() {
            let any: AnyRef = node.clone();
            if let Err(err) = network.serializer().save(&any) {
                warn!(node = node.id(), error = %err, "failed to persist created node");
            }
        }
    }

    fn on_create_context(&self, context: &ContextRef) {
        let Some(network) = self.network() else {
            return;
        };
        // the context document first, then the root that references it
        if let Err(err) = context.save() {
            warn!(error = %err, "failed to persist created context");
        }
        if let Err(err) = network.serializer().save(&network.root_ref()) {
            warn!(error = %err, "failed to persist the root document");
        }
    }

    fn on_save_context(&self, context: &ContextRef) {
        if let Ok(id) = context.serialization_id() {
            self.write(format!("context.save{SEPARATOR}{id}"));
        }
    }

    fn on_add_node(&self, context: &ContextRef, node: &NodeRef) {
        if let Ok(id) = context.serialization_id() {
            self.write(format!("context.addNode{SEPARATOR}{id}{SEPARATOR}{}", node.id()));
        }
    }

    fn on_remove_node_from_context(&self, context: &ContextRef, node: &NodeRef) {
        if let Ok(id) = context.serialization_id() {
            self.write(format!(
                "context.removeNode{SEPARATOR}{id}{SEPARATOR}{}",
                node.id()
            ));
        }
    }

    fn on_create_edge(&self, edge: &EdgeRef) {
        let Some(context) = edge.context() else {
            return;
        };
        if let Ok(id) = context.serialization_id() {
            self.write(format!(
                "context.createEdge{SEPARATOR}{id}{SEPARATOR}{}{SEPARATOR}{}",
                edge.src().id(),
                edge.dst().id()
            ));
        }
    }

    fn on_remove_edge(&self, edge: &EdgeRef) {
        let Some(context) = edge.context() else {
            return;
        };
        if let Ok(id) = context.serialization_id() {
            self.write(format!(
                "context.removeEdge{SEPARATOR}{id}{SEPARATOR}{}{SEPARATOR}{}",
                edge.src().id(),
                edge.dst().id()
            ));
        }
    }

    fn on_create_interaction(&self, interaction: &Interaction) {
        let Some(network) = self.network() else {
            return;
        };
        let Some(edge) = interaction.edge() else {
            return;
        };
        let Some(context) = edge.context() else {
            return;
        };
        let Ok(id) = context.serialization_id() else {
            return;
        };
        let payload = network.serializer().payload_to_string(interaction.data());
        if payload.contains(SEPARATOR) {
            warn!("interaction payload contains the journal separator; not journaled");
            return;
        }
        self.write(format!(
            "edge.createInteraction{SEPARATOR}{id}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            edge.src().id(),
            edge.dst().id(),
            interaction.start_time(),
            interaction.duration(),
            payload
        ));
    }
}
