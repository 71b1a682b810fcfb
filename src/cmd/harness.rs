//! Glue for coverage-guided fuzzing engines: a custom-mutator entry point
//! and a test-one-input entry point, both over a [`MessageCodec`].

use crate::{Config, Message, MessageCodec, Mutator};

/// Status handed back to the fuzzing engine from every test-one-input call.
/// Crashes in the code under test are detected by the engine itself.
pub const TEST_ONE_INPUT_OK: i32 = 0;

/// Decodes `data[..size]`, mutates it with an engine seeded from `seed`, and
/// writes the re-encoded result back into `data`.
///
/// Returns the new input length. When no mutated encoding fits in
/// `max_size` after `config.max_encode_attempts` attempts (the size hint is
/// halved after each oversized result), `data` is left untouched and `size`
/// is returned.
pub fn custom_mutate<C>(codec: &C, config: &Config, data: &mut [u8], size: usize, max_size: usize, seed: u32) -> usize
where
    C: MessageCodec + ?Sized,
{
    let size = size.min(data.len());
    let max_size = max_size.min(data.len());
    let msg = match codec.decode(&data[..size]) {
        Ok(msg) => msg,
        Err(err) => {
            tracing::debug!(%err, size, "input did not decode; starting from default message");
            codec.default_message()
        }
    };

    let mut engine = Mutator::with_config(seed, config.clone());
    let mut hint = max_size.saturating_sub(size);
    for attempt in 0..config.max_encode_attempts.max(1) {
        let mut candidate = msg.clone();
        if let Err(err) = engine.mutate(&mut candidate, hint) {
            tracing::debug!(%err, attempt, "mutate failed");
            continue;
        }
        match codec.encode(&candidate) {
            Ok(bytes) if bytes.len() <= max_size => {
                data[..bytes.len()].copy_from_slice(&bytes);
                return bytes.len();
            }
            Ok(bytes) => {
                tracing::debug!(attempt, len = bytes.len(), max_size, "encoding too large");
                hint /= 2;
            }
            Err(err) => {
                tracing::debug!(%err, attempt, "encode failed");
            }
        }
    }
    size
}

/// Decodes `data` and hands the instance to `run`. Undecodable inputs are
/// ignored. Always returns [`TEST_ONE_INPUT_OK`].
pub fn test_one_input<C, F>(codec: &C, data: &[u8], run: F) -> i32
where
    C: MessageCodec + ?Sized,
    F: FnOnce(&Message),
{
    match codec.decode(data) {
        Ok(msg) => run(&msg),
        Err(err) => tracing::trace!(%err, "skipping undecodable input"),
    }
    TEST_ONE_INPUT_OK
}
