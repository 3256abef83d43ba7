//! CommandStore - concurrent binding tables with change notifications
//!
//! Per-key mutations go through DashMap entry locks, so an add or remove on
//! one key is never observed half-done and independent keys do not contend.
//! The bound table sits behind an outer RwLock that is only taken for write
//! when a reload swaps in a fully built replacement table. Every binding
//! change bumps a generation counter under the read lock, so a reload can
//! tell whether the table moved while storage was being awaited.

use super::matcher;
use super::persistence::{CommandRepository, MemoryRepository};
use crate::events::{Observers, SubscriptionId};
use crate::model::{ActionKind, Command, CommandKey, MidiEvent, SavedCommand};
use anyhow::{Context, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

type BoundTable = DashMap<CommandKey, Vec<Command>>;

/// Saves retried when bindings change while the repository is written
const SAVE_ATTEMPTS: usize = 3;

/// Notification emitted after the command tables changed
#[derive(Debug, Clone, PartialEq)]
pub enum CommandsChanged {
    Added(Command),
    Removed(Command),
    /// Bound table replaced from storage
    Reloaded,
}

impl CommandsChanged {
    /// The affected command, `None` for a bulk reload
    pub fn command(&self) -> Option<&Command> {
        match self {
            CommandsChanged::Added(cmd) | CommandsChanged::Removed(cmd) => Some(cmd),
            CommandsChanged::Reloaded => None,
        }
    }
}

/// Thread-safe table of bound and learned commands
pub struct CommandStore {
    /// Saved bindings, insertion-ordered per key
    bound: RwLock<BoundTable>,
    /// Bumped on every binding add or removal
    generation: AtomicU64,
    /// Last unassigned event seen per key
    unbound: DashMap<CommandKey, Command>,
    repository: Arc<dyn CommandRepository>,
    changed: Observers<CommandsChanged>,
}

impl CommandStore {
    pub fn new(repository: Arc<dyn CommandRepository>) -> Self {
        Self {
            bound: RwLock::new(DashMap::new()),
            generation: AtomicU64::new(0),
            unbound: DashMap::new(),
            repository,
            changed: Observers::new(),
        }
    }

    /// Store backed by a process-local repository
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRepository::new()))
    }

    /// Add a learned command (empty id) or a binding
    ///
    /// Learned commands replace the previous one for their key. Bindings are
    /// appended to their key's bucket; a binding without an action or with a
    /// trigger range outside the control's legal bounds is rejected and
    /// leaves the store untouched.
    pub fn add_command(&self, command: Command) -> bool {
        if command.is_bound() {
            if command.action.kind == ActionKind::None {
                debug!("Rejected binding {} without action", command.id);
                return false;
            }
            if !command.event.is_well_formed() {
                debug!(
                    "Rejected binding {}: range {}..={} outside {}..={}",
                    command.id,
                    command.event.value,
                    command.event.value_range_high,
                    command.event.value_min,
                    command.event.value_max
                );
                return false;
            }
            let bound = self.bound.read();
            bound.entry(command.key()).or_default().push(command.clone());
            self.generation.fetch_add(1, Ordering::AcqRel);
            drop(bound);
            trace!("Bound {} to {}", command.key(), command.id);
        } else {
            self.unbound.insert(command.key(), command.clone());
            trace!("Learned {}", command.key());
        }

        self.changed.emit(&CommandsChanged::Added(command));
        true
    }

    /// Remove a learned command by key, or a binding by key and id
    pub fn del_command(&self, command: &Command) -> bool {
        let key = command.key();

        let removed = if command.is_bound() {
            let bound = self.bound.read();
            let (found, now_empty) = match bound.get_mut(&key) {
                Some(mut bucket) => {
                    let before = bucket.len();
                    bucket.retain(|existing| existing.id != command.id);
                    (bucket.len() != before, bucket.is_empty())
                }
                None => (false, false),
            };
            if now_empty {
                bound.remove_if(&key, |_, bucket| bucket.is_empty());
            }
            if found {
                self.generation.fetch_add(1, Ordering::AcqRel);
            }
            found
        } else {
            self.unbound.remove(&key).is_some()
        };

        if removed {
            self.changed.emit(&CommandsChanged::Removed(command.clone()));
        }
        removed
    }

    /// All learned and bound commands
    pub fn list_commands(&self) -> Vec<Command> {
        let mut commands: Vec<Command> = self
            .unbound
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let bound = self.bound.read();
        for bucket in bound.iter() {
            commands.extend(bucket.value().iter().cloned());
        }
        commands
    }

    /// Bindings for one key, in insertion order
    pub fn bound_commands(&self, key: &CommandKey) -> Vec<Command> {
        self.bound
            .read()
            .get(key)
            .map(|bucket| bucket.value().clone())
            .unwrap_or_default()
    }

    pub fn unbound_command(&self, key: &CommandKey) -> Option<Command> {
        self.unbound.get(key).map(|entry| entry.value().clone())
    }

    pub fn bound_count(&self) -> usize {
        self.bound.read().iter().map(|bucket| bucket.len()).sum()
    }

    pub fn unbound_count(&self) -> usize {
        self.unbound.len()
    }

    /// Resolve an incoming event against the bindings of its key
    pub fn get_action(&self, query: &MidiEvent) -> Option<Command> {
        let bound = self.bound.read();
        let bucket = bound.get(&query.key())?;
        matcher::resolve(bucket.value(), query)
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&CommandsChanged) + Send + Sync + 'static,
    {
        self.changed.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.changed.unsubscribe(id)
    }

    /// Replace the bound table with the repository contents
    ///
    /// On failure the current table is kept as is. Bindings added or removed
    /// while the repository is read are carried over onto the loaded table.
    pub async fn load_commands(&self) -> Result<usize> {
        let (generation, known, _) = self.snapshot();
        self.reload(generation, &known).await
    }

    /// Persist every binding with an action, then reload from storage
    ///
    /// The save is repeated when bindings change while it is in flight. If
    /// they keep changing, the in-memory table is kept and not reloaded.
    pub async fn save_commands(&self) -> Result<usize> {
        let mut saved = 0;
        for attempt in 1..=SAVE_ATTEMPTS {
            let (generation, known, commands) = self.snapshot();
            saved = commands.len();

            self.repository.save(&commands).await.with_context(|| {
                format!(
                    "Failed to save commands to {} repository",
                    self.repository.name()
                )
            })?;

            if self.generation.load(Ordering::Acquire) == generation {
                return self.reload(generation, &known).await;
            }
            debug!("Bindings changed during save attempt {}", attempt);
        }

        warn!(
            "Bindings kept changing while saving to {} repository, reload skipped",
            self.repository.name()
        );
        Ok(saved)
    }

    /// Generation, binding ids and persistable records of the bound table
    fn snapshot(&self) -> (u64, HashSet<String>, Vec<SavedCommand>) {
        let bound = self.bound.read();
        let generation = self.generation.load(Ordering::Acquire);
        let mut known = HashSet::new();
        let mut commands = Vec::new();
        for bucket in bound.iter() {
            for command in bucket.value() {
                known.insert(command.id.clone());
                if command.is_persistable() {
                    commands.push(SavedCommand::from(command));
                }
            }
        }
        (generation, known, commands)
    }

    /// Swap in the repository contents, keeping edits made since `generation`
    async fn reload(&self, generation: u64, known: &HashSet<String>) -> Result<usize> {
        let saved = self.repository.load().await.with_context(|| {
            format!(
                "Failed to load commands from {} repository",
                self.repository.name()
            )
        })?;

        let table = BoundTable::new();
        let mut loaded = 0;
        for command in saved.into_iter().map(Command::from) {
            if !command.is_persistable() || !command.event.is_well_formed() {
                warn!("Skipping invalid saved command for {}", command.key());
                continue;
            }
            table.entry(command.key()).or_default().push(command);
            loaded += 1;
        }

        {
            let mut bound = self.bound.write();
            if self.generation.load(Ordering::Acquire) != generation {
                let current: HashSet<String> = bound
                    .iter()
                    .flat_map(|bucket| {
                        bucket
                            .value()
                            .iter()
                            .map(|cmd| cmd.id.clone())
                            .collect::<Vec<_>>()
                    })
                    .collect();

                for mut bucket in table.iter_mut() {
                    bucket.retain(|cmd| current.contains(&cmd.id) || !known.contains(&cmd.id));
                }
                table.retain(|_, bucket| !bucket.is_empty());

                for bucket in bound.iter() {
                    for command in bucket.value().iter().filter(|cmd| !known.contains(&cmd.id)) {
                        let mut target = table.entry(command.key()).or_default();
                        if !target.iter().any(|cmd| cmd.id == command.id) {
                            target.push(command.clone());
                        }
                    }
                }
                debug!("Carried binding edits made during reload");
            }
            *bound = table;
        }

        info!(
            "Loaded {} command records from {} repository",
            loaded,
            self.repository.name()
        );

        self.changed.emit(&CommandsChanged::Reloaded);
        Ok(loaded)
    }
}

impl Default for CommandStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::persistence::PersistenceError;
    use crate::model::{
        AxisAction, AxisName, ButtonAction, ButtonNumber, ButtonSubtype, JoystickAction,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tokio::sync::Notify;

    fn raw(value: i32) -> MidiEvent {
        MidiEvent::new("Controller-X", "Ctrl 7", value, 0, 127)
    }

    fn binding(low: i32, high: i32) -> Command {
        Command::learned(raw(low))
            .bind(JoystickAction::axis(
                1,
                AxisAction::absolute(AxisName::X, 0.0),
            ))
            .with_range(low, high)
    }

    fn button_binding(value: i32) -> Command {
        Command::learned(raw(value)).bind(JoystickAction::button(
            1,
            ButtonAction::new(ButtonNumber::new(2).unwrap(), ButtonSubtype::Press),
        ))
    }

    struct FailingRepository;

    #[async_trait]
    impl CommandRepository for FailingRepository {
        fn name(&self) -> &str {
            "failing"
        }

        async fn load(&self) -> Result<Vec<SavedCommand>, PersistenceError> {
            Err(std::io::Error::other("disk on fire").into())
        }

        async fn save(&self, _commands: &[SavedCommand]) -> Result<(), PersistenceError> {
            Err(std::io::Error::other("disk on fire").into())
        }
    }

    /// Memory repository whose first load or save waits for `release`
    struct ParkedRepository {
        inner: MemoryRepository,
        armed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    impl ParkedRepository {
        fn new(commands: Vec<SavedCommand>) -> Self {
            Self {
                inner: MemoryRepository::with_commands(commands),
                armed: AtomicBool::new(true),
                entered: Notify::new(),
                release: Notify::new(),
            }
        }

        async fn park(&self) {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
        }
    }

    #[async_trait]
    impl CommandRepository for ParkedRepository {
        fn name(&self) -> &str {
            "parked"
        }

        async fn load(&self) -> Result<Vec<SavedCommand>, PersistenceError> {
            self.park().await;
            self.inner.load().await
        }

        async fn save(&self, commands: &[SavedCommand]) -> Result<(), PersistenceError> {
            self.park().await;
            self.inner.save(commands).await
        }
    }

    #[test]
    fn test_unbound_singleton_per_key() {
        let store = CommandStore::in_memory();

        for value in [1, 50, 99] {
            assert!(store.add_command(Command::learned(raw(value))));
        }

        assert_eq!(store.unbound_count(), 1);
        let kept = store.unbound_command(&raw(0).key()).unwrap();
        assert_eq!(kept.event.value, 99);
    }

    #[test]
    fn test_binding_without_action_rejected() {
        let store = CommandStore::in_memory();
        let events = Arc::new(AtomicUsize::new(0));
        let events_clone = events.clone();
        store.subscribe(move |_| {
            events_clone.fetch_add(1, Ordering::SeqCst);
        });

        let mut cmd = Command::learned(raw(1));
        cmd.id = "manual".to_string();

        assert!(!store.add_command(cmd));
        assert_eq!(store.bound_count(), 0);
        assert_eq!(events.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_binding_outside_legal_range_rejected() {
        let store = CommandStore::in_memory();
        assert!(!store.add_command(binding(100, 200)));
        assert!(!store.add_command(binding(90, 80)));
        assert_eq!(store.bound_count(), 0);

        assert!(store.add_command(binding(0, 127)));
    }

    #[test]
    fn test_bindings_keep_insertion_order() {
        let store = CommandStore::in_memory();
        let first = binding(0, 63);
        let second = binding(64, 127);
        store.add_command(first.clone());
        store.add_command(second.clone());

        let bucket = store.bound_commands(&first.key());
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket[0].id, first.id);
        assert_eq!(bucket[1].id, second.id);
    }

    #[test]
    fn test_del_command() {
        let store = CommandStore::in_memory();
        let keep = binding(0, 63);
        let removed = binding(64, 127);
        store.add_command(keep.clone());
        store.add_command(removed.clone());
        store.add_command(Command::learned(raw(3)));

        assert!(store.del_command(&removed));
        assert!(!store.del_command(&removed));
        assert_eq!(store.bound_commands(&keep.key()).len(), 1);

        assert!(store.del_command(&Command::learned(raw(3))));
        assert!(!store.del_command(&Command::learned(raw(3))));

        assert!(store.del_command(&keep));
        assert!(store.bound_commands(&keep.key()).is_empty());
        assert_eq!(store.bound_count(), 0);
    }

    #[test]
    fn test_del_unknown_key() {
        let store = CommandStore::in_memory();
        let other = Command::learned(MidiEvent::new("Other", "Ctrl 1", 0, 0, 127))
            .bind(JoystickAction::axis(1, AxisAction::default()));
        assert!(!store.del_command(&other));
    }

    #[test]
    fn test_list_is_union_of_tables() {
        let store = CommandStore::in_memory();
        store.add_command(Command::learned(raw(1)));
        store.add_command(binding(0, 127));
        store.add_command(button_binding(127));

        let listed = store.list_commands();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed.iter().filter(|c| c.is_bound()).count(), 2);
    }

    #[test]
    fn test_notifications_carry_command() {
        let store = CommandStore::in_memory();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        store.subscribe(move |change| seen_clone.lock().push(change.clone()));

        let cmd = binding(0, 127);
        store.add_command(cmd.clone());
        store.del_command(&cmd);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], CommandsChanged::Added(cmd.clone()));
        assert_eq!(seen[1].command(), Some(&cmd));
    }

    #[test]
    fn test_get_action_uses_bound_table_only() {
        let store = CommandStore::in_memory();
        store.add_command(Command::learned(raw(10)));
        assert!(store.get_action(&raw(10)).is_none());

        let cmd = binding(0, 127);
        store.add_command(cmd.clone());
        let resolved = store.get_action(&raw(127)).unwrap();
        assert_eq!(resolved.id, cmd.id);
        assert_eq!(resolved.action.axis.percent, 1.0);
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let repo = Arc::new(MemoryRepository::new());
        let store = CommandStore::new(repo.clone());
        let axis = binding(0, 127);
        let button = button_binding(127);
        store.add_command(axis.clone());
        store.add_command(button.clone());
        store.add_command(Command::learned(raw(5)));

        assert_eq!(store.save_commands().await.unwrap(), 2);
        assert_eq!(repo.snapshot().len(), 2);

        let fresh = CommandStore::new(repo);
        assert_eq!(fresh.load_commands().await.unwrap(), 2);
        let mut ids: Vec<String> = fresh.list_commands().into_iter().map(|c| c.id).collect();
        ids.sort();
        let mut expected = vec![axis.id, button.id];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_reload_replaces_bound_but_keeps_learned() {
        let store = CommandStore::in_memory();
        store.add_command(binding(0, 127));
        store.add_command(Command::learned(raw(5)));

        let reloads = Arc::new(AtomicUsize::new(0));
        let reloads_clone = reloads.clone();
        store.subscribe(move |change| {
            if *change == CommandsChanged::Reloaded {
                reloads_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert_eq!(store.load_commands().await.unwrap(), 0);
        assert_eq!(store.bound_count(), 0);
        assert_eq!(store.unbound_count(), 1);
        assert_eq!(reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_table() {
        let store = CommandStore::new(Arc::new(FailingRepository));
        let cmd = binding(0, 127);
        store.add_command(cmd.clone());

        assert!(store.load_commands().await.is_err());
        assert!(store.save_commands().await.is_err());
        assert_eq!(store.bound_commands(&cmd.key()).len(), 1);
    }

    #[tokio::test]
    async fn test_load_skips_invalid_records() {
        let valid = SavedCommand::from(&binding(0, 127));
        let mut unbound = valid.clone();
        unbound.id = String::new();
        let mut no_action = valid.clone();
        no_action.id = "x".to_string();
        no_action.kind = ActionKind::None;

        let repo = Arc::new(MemoryRepository::with_commands(vec![valid, unbound, no_action]));
        let store = CommandStore::new(repo);
        assert_eq!(store.load_commands().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_binding_added_during_save_is_kept() {
        let repo = Arc::new(ParkedRepository::new(Vec::new()));
        let store = Arc::new(CommandStore::new(repo.clone()));
        store.add_command(binding(0, 63));

        let saving = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.save_commands().await }
        });
        repo.entered.notified().await;

        let late = binding(64, 127);
        assert!(store.add_command(late.clone()));
        repo.release.notify_one();

        assert_eq!(saving.await.unwrap().unwrap(), 2);
        assert_eq!(store.bound_count(), 2);
        assert_eq!(store.bound_commands(&late.key())[1].id, late.id);
        assert_eq!(repo.inner.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_edits_during_load_survive_reload() {
        let stored = binding(0, 31);
        let removed = binding(32, 63);
        let repo = Arc::new(ParkedRepository::new(vec![
            SavedCommand::from(&stored),
            SavedCommand::from(&removed),
        ]));
        let store = Arc::new(CommandStore::new(repo.clone()));
        store.add_command(removed.clone());

        let loading = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.load_commands().await }
        });
        repo.entered.notified().await;

        let added = binding(64, 127);
        store.add_command(added.clone());
        assert!(store.del_command(&removed));
        repo.release.notify_one();

        assert_eq!(loading.await.unwrap().unwrap(), 2);
        let ids: Vec<String> = store
            .bound_commands(&stored.key())
            .into_iter()
            .map(|cmd| cmd.id)
            .collect();
        assert_eq!(ids, vec![stored.id, added.id]);
    }

    #[test]
    fn test_concurrent_learning_and_matching() {
        let store = Arc::new(CommandStore::in_memory());
        store.add_command(binding(0, 127));

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let event =
                            MidiEvent::new("Controller-X", format!("Ctrl {}", worker), i % 128, 0, 127);
                        store.add_command(Command::learned(event));
                        assert!(store.get_action(&raw(i % 128)).is_some());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.unbound_count(), 4);
    }
}
