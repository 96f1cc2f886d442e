// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed OBU payloads.
//!
//! Every type here follows the same three-operation surface: `create` builds and validates a
//! value in memory, `create_from_buffer` parses one from a payload already known to be
//! `payload_size` bytes long, and `validate_and_write_obu` serializes the header and payload
//! together. Payloads that declare more bytes than the typed reader consumes keep the remainder
//! in a `footer` field rather than erroring, per the residual-bytes contract.

pub mod arbitrary;
pub mod audio_element;
pub mod audio_frame;
pub mod codec_config;
pub mod ia_sequence_header;
pub mod metadata;
pub mod mix_presentation;
pub mod parameter_block;
pub mod temporal_delimiter;

use crate::errors::{unknown_error, Result};
use crate::io::BitReader;

/// Reads whatever bytes remain of a `payload_size`-byte payload after a typed reader has
/// consumed `consumed_before` bytes up front, measured from `reader`'s position when the typed
/// read of this OBU began.
pub fn read_footer(
    reader: &mut BitReader<'_>,
    payload_start_byte: usize,
    payload_size: u64,
) -> Result<Vec<u8>> {
    let consumed = (reader.byte_pos() - payload_start_byte) as u64;
    if consumed > payload_size {
        return unknown_error(format!(
            "typed reader consumed {consumed} bytes, more than the declared payload_size {payload_size}"
        ));
    }
    let remaining = (payload_size - consumed) as usize;
    Ok(reader.read_uint8_span(remaining)?.to_vec())
}
