// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Framed serial protocol between the host application and the acquisition
//! firmware: a restartable byte-stuffed codec ([`codec`]) carrying
//! length-delimited, checksummed, type-tagged messages ([`message`]).

#![cfg_attr(not(test), no_std)]

pub mod codec;
pub mod message;

pub use codec::{ByteCodec, CodecError, DecodedFrame, EOM, MAX_INCOMING_PAYLOAD, SOM};
pub use message::{
    decode, encode_samples_payload, encode_sync, msg_type, samples_flags, ChannelConfig,
    IncomingMessage, MAX_CHANNELS, ProtocolError, SyncResponse, TriggerBlock,
};
