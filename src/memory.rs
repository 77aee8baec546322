//! Per-session conversation memory.
//!
//! Each session keeps its own bounded list of [`Turn`]s; when the bound is
//! reached the oldest turn is dropped. The number of sessions is bounded
//! too: starting a new session past `max_sessions` evicts the one that was
//! least recently used. The lock is only held for the map operation itself,
//! never across an await.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use crate::models::Turn;

struct Session {
    turns: VecDeque<Turn>,
    last_used: u64,
}

#[derive(Default)]
struct Sessions {
    by_id: HashMap<String, Session>,
    clock: u64,
}

pub struct ConversationMemory {
    sessions: RwLock<Sessions>,
    max_turns: usize,
    max_sessions: usize,
}

impl ConversationMemory {
    pub fn new(max_turns: usize, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(Sessions::default()),
            max_turns,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Turns of `session`, oldest first.
    pub fn history(&self, session: &str) -> Vec<Turn> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .by_id
            .get(session)
            .map(|s| s.turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn append(&self, session: &str, turn: Turn) {
        if self.max_turns == 0 {
            return;
        }
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.clock += 1;
        let now = sessions.clock;

        if !sessions.by_id.contains_key(session) && sessions.by_id.len() >= self.max_sessions {
            let oldest = sessions
                .by_id
                .iter()
                .min_by_key(|(_, s)| s.last_used)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                tracing::debug!(session = %id, "Evicting least recently used session");
                sessions.by_id.remove(&id);
            }
        }

        let entry = sessions
            .by_id
            .entry(session.to_string())
            .or_insert_with(|| Session {
                turns: VecDeque::new(),
                last_used: now,
            });
        entry.last_used = now;
        entry.turns.push_back(turn);
        while entry.turns.len() > self.max_turns {
            entry.turns.pop_front();
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(n: usize) -> Turn {
        Turn {
            question: format!("q{}", n),
            answer: format!("a{}", n),
        }
    }

    #[test]
    fn test_oldest_turns_dropped() {
        let memory = ConversationMemory::new(3, 10);
        for n in 0..5 {
            memory.append("s1", turn(n));
        }
        let history = memory.history("s1");
        assert_eq!(history, vec![turn(2), turn(3), turn(4)]);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let memory = ConversationMemory::new(10, 10);
        memory.append("alice", turn(1));
        memory.append("bob", turn(2));
        assert_eq!(memory.history("alice"), vec![turn(1)]);
        assert_eq!(memory.history("bob"), vec![turn(2)]);
        assert!(memory.history("carol").is_empty());
    }

    #[test]
    fn test_least_recently_used_session_evicted() {
        let memory = ConversationMemory::new(10, 2);
        memory.append("alice", turn(1));
        memory.append("bob", turn(2));
        // alice is touched again, so bob becomes the oldest
        memory.append("alice", turn(3));
        memory.append("carol", turn(4));

        assert_eq!(memory.session_count(), 2);
        assert!(memory.history("bob").is_empty());
        assert_eq!(memory.history("alice"), vec![turn(1), turn(3)]);
        assert_eq!(memory.history("carol"), vec![turn(4)]);
    }

    #[test]
    fn test_session_count_never_exceeds_limit() {
        let memory = ConversationMemory::new(2, 5);
        for n in 0..50 {
            memory.append(&format!("s{}", n), turn(n));
        }
        assert_eq!(memory.session_count(), 5);
        assert_eq!(memory.history("s49"), vec![turn(49)]);
        assert!(memory.history("s0").is_empty());
    }
}
