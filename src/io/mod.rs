// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module implements bit-granular serialization and parsing of OBU payloads.
//!
//! [`BitWriter`] is an append-only sink used as scratch storage while an OBU serializes its
//! payload. [`BitReader`] is a forward-only cursor over a borrowed byte slice used to parse one
//! back. Both speak the same primitive vocabulary: fixed-width signed/unsigned literals,
//! byte-aligned spans and strings, and ULEB128 variable-length integers.

mod bit_reader;
mod bit_writer;
pub mod uleb128;

pub use bit_reader::BitReader;
pub use bit_writer::BitWriter;
pub use uleb128::Uleb128Policy;
