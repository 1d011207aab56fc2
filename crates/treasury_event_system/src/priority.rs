use serde::{Deserialize, Serialize};

/// Order in which subscribers of one event type run.
///
/// Subscribers run from [`Lowest`](EventPriority::Lowest) to
/// [`Highest`](EventPriority::Highest), so the highest priority sees the
/// event last and has the final say on its state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_run_low_to_high() {
        let mut priorities = vec![
            EventPriority::High,
            EventPriority::Lowest,
            EventPriority::Normal,
            EventPriority::Highest,
            EventPriority::Low,
        ];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![
                EventPriority::Lowest,
                EventPriority::Low,
                EventPriority::Normal,
                EventPriority::High,
                EventPriority::Highest,
            ]
        );
        assert_eq!(EventPriority::default(), EventPriority::Normal);
    }
}
