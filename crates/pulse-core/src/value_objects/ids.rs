//! Generated identifiers for calls and mailbox entries

use chrono::Utc;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

/// Current wall-clock time in epoch milliseconds
#[inline]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn random_suffix() -> String {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

/// Fresh call id: `call_{epoch_ms}_{suffix}`
pub fn generate_call_id() -> String {
    format!("call_{}_{}", now_millis(), random_suffix())
}

/// Fresh mailbox entry id: `{epoch_ms}-{suffix}`
pub fn generate_entry_id() -> String {
    format!("{}-{}", now_millis(), random_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_id_shape() {
        let id = generate_call_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "call");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), SUFFIX_LEN);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(generate_call_id(), generate_call_id());
        assert_ne!(generate_entry_id(), generate_entry_id());
    }
}
