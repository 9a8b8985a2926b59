// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identifier generation for group aliases.

use rand::Rng;

const ALIAS_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ALIAS_LEN: usize = 6;

/// Generate a short alias handed out by the `/register` command.
pub fn generate_alias() -> String {
    let mut rng = rand::thread_rng();
    (0..ALIAS_LEN)
        .map(|_| ALIAS_CHARS[rng.gen_range(0..ALIAS_CHARS.len())] as char)
        .collect()
}
