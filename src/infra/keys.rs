//! Opaque token generation for sessions and login tokens.
use rand::RngCore;

pub fn generate_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_long_and_unique() {
        let a = generate_key();
        let b = generate_key();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}
