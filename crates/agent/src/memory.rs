use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use aula_core::domain::conversation::{ConversationId, MemoryEntry};
use tokio::sync::{Mutex, RwLock};

/// Entries kept per conversation; the oldest is evicted first.
pub const DEFAULT_MEMORY_CAPACITY: usize = 10;

type Entries = Arc<Mutex<VecDeque<MemoryEntry>>>;

/// Bounded per-conversation history.
///
/// Each conversation has its own lock, so appends to different conversations never wait on
/// each other and appends to the same conversation are serialized.
#[derive(Debug)]
pub struct ConversationMemory {
    capacity: usize,
    conversations: RwLock<HashMap<ConversationId, Entries>>,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), conversations: RwLock::new(HashMap::new()) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn append(&self, conversation_id: ConversationId, entry: MemoryEntry) {
        self.record(conversation_id, entry).await;
    }

    /// Appends `entry` and returns the entry that was last before it, in one step.
    pub async fn record(
        &self,
        conversation_id: ConversationId,
        entry: MemoryEntry,
    ) -> Option<MemoryEntry> {
        let slot = self.slot(conversation_id).await;
        let mut entries = slot.lock().await;
        let previous = entries.back().cloned();
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        previous
    }

    /// Oldest first. Unknown conversations have an empty history.
    pub async fn history(&self, conversation_id: ConversationId) -> Vec<MemoryEntry> {
        match self.existing(conversation_id).await {
            Some(slot) => slot.lock().await.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub async fn last(&self, conversation_id: ConversationId) -> Option<MemoryEntry> {
        let slot = self.existing(conversation_id).await?;
        let entries = slot.lock().await;
        entries.back().cloned()
    }

    /// Forgets the conversation entirely; its next entry starts a fresh history.
    pub async fn clear(&self, conversation_id: ConversationId) {
        let removed = self.conversations.write().await.remove(&conversation_id);
        if let Some(slot) = removed {
            slot.lock().await.clear();
        }
    }

    async fn existing(&self, conversation_id: ConversationId) -> Option<Entries> {
        self.conversations.read().await.get(&conversation_id).cloned()
    }

    async fn slot(&self, conversation_id: ConversationId) -> Entries {
        if let Some(slot) = self.existing(conversation_id).await {
            return slot;
        }
        self.conversations.write().await.entry(conversation_id).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use aula_core::domain::conversation::{ConversationId, MemoryEntry};
    use aula_core::domain::entity::Entities;
    use proptest::prelude::*;

    use super::{ConversationMemory, DEFAULT_MEMORY_CAPACITY};

    fn entry(message: &str, intent: &str) -> MemoryEntry {
        MemoryEntry::new(message, intent, Entities::new(), "respuesta")
    }

    #[tokio::test]
    async fn history_is_oldest_first_and_bounded() {
        let memory = ConversationMemory::new();
        let id = ConversationId(1);

        for index in 0..(DEFAULT_MEMORY_CAPACITY + 3) {
            memory.append(id, entry(&format!("mensaje {index}"), "general")).await;
        }

        let history = memory.history(id).await;
        assert_eq!(history.len(), DEFAULT_MEMORY_CAPACITY);
        assert_eq!(history[0].message, "mensaje 3");
        assert_eq!(
            history.last().map(|entry| entry.message.as_str()),
            Some(format!("mensaje {}", DEFAULT_MEMORY_CAPACITY + 2).as_str())
        );
    }

    #[tokio::test]
    async fn record_returns_previous_last_entry() {
        let memory = ConversationMemory::new();
        let id = ConversationId(2);

        assert!(memory.record(id, entry("uno", "consulta_alumnos")).await.is_none());
        let previous = memory.record(id, entry("dos", "alumnos_riesgo")).await;

        assert_eq!(previous.map(|entry| entry.intent), Some("consulta_alumnos".to_string()));
        assert_eq!(memory.last(id).await.map(|entry| entry.message), Some("dos".to_string()));
    }

    #[tokio::test]
    async fn conversations_are_isolated_and_clear_is_scoped() {
        let memory = ConversationMemory::new();
        memory.append(ConversationId(1), entry("a", "general")).await;
        memory.append(ConversationId(2), entry("b", "general")).await;

        memory.clear(ConversationId(1)).await;

        assert!(memory.history(ConversationId(1)).await.is_empty());
        assert_eq!(memory.history(ConversationId(2)).await.len(), 1);
        assert!(memory.history(ConversationId(99)).await.is_empty());
    }

    #[tokio::test]
    async fn cleared_conversations_release_their_slot() {
        let memory = ConversationMemory::new();
        for id in 0..5 {
            memory.append(ConversationId(id), entry("hola", "general")).await;
        }

        for id in 0..5 {
            memory.clear(ConversationId(id)).await;
        }
        memory.clear(ConversationId(42)).await;

        assert!(memory.conversations.read().await.is_empty());
        assert!(memory.record(ConversationId(1), entry("otra vez", "general")).await.is_none());
    }

    #[test]
    fn zero_capacity_keeps_one_entry() {
        assert_eq!(ConversationMemory::with_capacity(0).capacity(), 1);
        assert_eq!(ConversationMemory::new().capacity(), DEFAULT_MEMORY_CAPACITY);
    }

    #[tokio::test]
    async fn concurrent_appends_are_not_lost() {
        let memory = Arc::new(ConversationMemory::with_capacity(64));
        let id = ConversationId(7);

        let mut handles = Vec::new();
        for index in 0..32 {
            let memory = memory.clone();
            handles.push(tokio::spawn(async move {
                memory.append(id, entry(&format!("m{index}"), "general")).await;
            }));
        }
        for handle in handles {
            handle.await.expect("append task");
        }

        assert_eq!(memory.history(id).await.len(), 32);
    }

    proptest! {
        #[test]
        fn history_never_exceeds_capacity(capacity in 1usize..16, appends in 0usize..40) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .expect("runtime");
            let memory = ConversationMemory::with_capacity(capacity);
            let id = ConversationId(3);

            let history = runtime.block_on(async {
                for index in 0..appends {
                    memory.append(id, entry(&format!("m{index}"), "general")).await;
                }
                memory.history(id).await
            });

            prop_assert_eq!(history.len(), appends.min(memory.capacity()));
            if let Some(last) = history.last() {
                prop_assert_eq!(&last.message, &format!("m{}", appends - 1));
            }
        }
    }
}
