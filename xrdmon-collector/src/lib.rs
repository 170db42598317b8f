/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Collector for xrootd monitoring streams: a UDP listener for live
//! collection and a replay driver for recorded captures, both built on
//! `xrdmon-decoder`.

pub mod capture;
pub mod cli_args;
pub mod config;
pub mod listener;
pub mod replay;
pub mod senders;
