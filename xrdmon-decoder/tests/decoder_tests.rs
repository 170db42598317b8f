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

//! End-to-end tests driving `PacketDecoder` with generated packets.

use xrdmon_decoder::builder::{PacketBuilder, TraceEntryBuilder};
use xrdmon_decoder::{
    DecoderMode, DecoderPhase, DiscardReason, MemorySink, PacketDecoder, PacketOutcome,
    SenderId, SequenceCheck, Sink, TraceRecord,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn real_time_decoder() -> PacketDecoder<MemorySink> {
    init_logging();
    let mut decoder = PacketDecoder::with_sink(MemorySink::new(), DecoderMode::RealTime);
    decoder.init(0, 10_000, "data01.example.org:1094").unwrap();
    decoder
}

fn replay_decoder(up_to_time: i64) -> PacketDecoder<MemorySink> {
    init_logging();
    let mut decoder = PacketDecoder::with_sink(
        MemorySink::new(),
        DecoderMode::Historical {
            up_to_time: Some(up_to_time),
        },
    );
    decoder.init(0, 10_000, "data01.example.org:1094").unwrap();
    decoder
}

fn reads(count: usize) -> Vec<[u8; 16]> {
    (0..count)
        .map(|i| TraceEntryBuilder::read(i as u64 * 4096, 4096, 7))
        .collect()
}

mod sequence {
    use super::*;

    #[test]
    fn test_loss_total_over_a_long_stream() {
        let mut decoder = real_time_decoder();
        let mut builder = PacketBuilder::new(1_700_000_000).starting_at_seq(250);
        let mut expected = 0u64;

        for round in 0..40u8 {
            let gap = round % 4;
            builder.skip(gap);
            if round > 0 {
                expected += u64::from(gap);
            }
            let packet = builder.dictionary(u32::from(round) + 1, "/store/data");
            decoder.decode_raw(&packet, None).unwrap();
        }

        assert_eq!(decoder.statistics().lost_packets, expected);
        assert_eq!(decoder.sequences().total_lost(), expected);
        assert_eq!(decoder.sink().dictionary.len(), 40);
    }

    #[test]
    fn test_wraparound_is_not_loss() {
        let mut decoder = real_time_decoder();
        let mut builder = PacketBuilder::new(0).starting_at_seq(254);
        for _ in 0..4 {
            let packet = builder.dictionary(1, "/f");
            let report = decoder.decode_raw(&packet, None).unwrap();
            assert_eq!(report.lost(), 0);
        }
        assert_eq!(decoder.last_seq(), Some(1));
    }

    #[test]
    fn test_duplicate_reported() {
        let mut decoder = real_time_decoder();
        let packet = PacketBuilder::new(0).dictionary(1, "/f");
        decoder.decode_raw(&packet, None).unwrap();
        let report = decoder.decode_raw(&packet, None).unwrap();
        assert_eq!(report.sequence, Some(SequenceCheck::Duplicate));
        assert_eq!(decoder.statistics().duplicate_packets, 1);
    }

    #[test]
    fn test_senders_have_independent_sequences() {
        let mut decoder = real_time_decoder();
        let a = SenderId::new(1);
        let b = SenderId::new(2);
        let mut from_a = PacketBuilder::new(0);
        let mut from_b = PacketBuilder::new(0).starting_at_seq(100);

        for _ in 0..3 {
            decoder.decode_raw(&from_a.dictionary(1, "/a"), a).unwrap();
            decoder.decode_raw(&from_b.dictionary(2, "/b"), b).unwrap();
        }
        assert_eq!(decoder.statistics().lost_packets, 0);
        assert_eq!(decoder.sequences().last_seq(a), Some(2));
        assert_eq!(decoder.sequences().last_seq(b), Some(102));
    }
}

mod trace {
    use super::*;

    #[test]
    fn test_window_timestamps_are_monotonic_and_bounded() {
        let mut decoder = real_time_decoder();
        let records = reads(7);
        let packet = PacketBuilder::new(0)
            .trace(&TraceEntryBuilder::single_window(1_000, 1_100, &records));
        decoder.decode_raw(&packet, None).unwrap();

        let timestamps = decoder.sink().timestamps();
        assert_eq!(timestamps.len(), 7);
        assert_eq!(timestamps[0], 1_000);
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
        assert!(timestamps.iter().all(|&t| (1_000..1_100).contains(&t)));
    }

    #[test]
    fn test_truncated_final_entry_keeps_complete_ones() {
        let mut decoder = real_time_decoder();
        let records = reads(3);
        let mut packet = PacketBuilder::new(0)
            .trace(&TraceEntryBuilder::single_window(10, 40, &records));
        // Chop the closing mark in half; the header still declares the full length
        packet.truncate(packet.len() - 8);

        let report = decoder.decode_raw(&packet, None).unwrap();
        assert_eq!(report.forwarded, 3);
        assert_eq!(decoder.statistics().truncated_subrecords, 1);
        assert_eq!(decoder.statistics().unterminated_windows, 1);
        assert!(decoder
            .sink()
            .trace_records()
            .all(|r| matches!(r, TraceRecord::ReadWrite(_))));
    }

    #[test]
    fn test_mixed_subrecords_decode_in_order() {
        let mut decoder = real_time_decoder();
        let records = [
            TraceEntryBuilder::open(0x01, 1 << 30, 42),
            TraceEntryBuilder::read(0, 65_536, 42),
            TraceEntryBuilder::write(65_536, 512, 42),
            TraceEntryBuilder::close_shifted(3, 10, 1, 0, 42),
            TraceEntryBuilder::disconnect(0x01, 3_600, 9),
        ];
        let packet = PacketBuilder::new(0)
            .trace(&TraceEntryBuilder::single_window(500, 600, &records));
        decoder.decode_raw(&packet, None).unwrap();

        let decoded: Vec<&TraceRecord> = decoder.sink().trace_records().collect();
        assert_eq!(decoded.len(), 5);
        match decoded[0] {
            TraceRecord::Open(open) => {
                assert!(open.is_read_write());
                assert_eq!(open.file_size, 1 << 30);
            }
            other => panic!("expected open, got {other:?}"),
        }
        match decoded[2] {
            TraceRecord::ReadWrite(rw) => {
                assert!(rw.is_write());
                assert_eq!(rw.bytes(), 512);
            }
            other => panic!("expected write, got {other:?}"),
        }
        match decoded[3] {
            TraceRecord::Close(close) => {
                assert_eq!(close.bytes_read, 3 << 10);
                assert_eq!(close.bytes_written, 1);
            }
            other => panic!("expected close, got {other:?}"),
        }
        match decoded[4] {
            TraceRecord::Disconnect(disc) => {
                assert!(disc.is_forced());
                assert_eq!(disc.duration_secs, 3_600);
            }
            other => panic!("expected disconnect, got {other:?}"),
        }
    }
}

mod packets {
    use super::*;

    #[test]
    fn test_unknown_packet_leaves_state_untouched() {
        let mut decoder = real_time_decoder();
        let mut builder = PacketBuilder::new(0);
        decoder
            .decode_raw(&builder.dictionary(1, "/f"), None)
            .unwrap();

        let unknown = builder.raw(b'x', &[1, 2, 3, 4]);
        let report = decoder.decode_raw(&unknown, None).unwrap();

        assert_eq!(
            report.outcome,
            PacketOutcome::Discarded(DiscardReason::UnknownKind(b'x'))
        );
        assert_eq!(report.sequence, None);
        assert_eq!(decoder.last_seq(), Some(0));
        assert_eq!(decoder.sequences().last_seq(None), Some(0));
        assert_eq!(decoder.sink().dictionary.len(), 1);
        assert_eq!(decoder.statistics().unknown_packets, 1);
    }

    #[test]
    fn test_dictionary_text_with_padding() {
        let mut decoder = real_time_decoder();
        let packet = PacketBuilder::new(0).dictionary(3, "alice.17:5@client.example.org\n/store/x.root\0\0\0");
        decoder.decode_raw(&packet, None).unwrap();

        let entry = &decoder.sink().dictionary[0].1;
        assert_eq!(entry.path, "/store/x.root");
        let identity = entry.identity.as_ref().unwrap();
        assert_eq!(identity.user, "alice");
        assert_eq!(identity.pid, Some(17));
        assert_eq!(identity.session, Some(5));
        assert_eq!(identity.host, "client.example.org");
    }
}

mod lifecycle {
    use super::*;

    #[test]
    fn test_stop_is_sticky_until_reset() {
        let mut decoder = replay_decoder(1_050);
        let mut builder = PacketBuilder::new(0);

        let first = builder.trace(&TraceEntryBuilder::single_window(1_000, 1_100, &reads(4)));
        let report = decoder.decode_raw(&first, None).unwrap();
        assert_eq!(report.outcome, PacketOutcome::ReachedStopBound);
        assert!(decoder.stop_now());
        let forwarded = decoder.sink().traces.len();
        assert_eq!(forwarded, 3);

        let later = builder.dictionary(1, "/late");
        let report = decoder.decode_raw(&later, None).unwrap();
        assert_eq!(report.outcome, PacketOutcome::IgnoredStopped);
        assert!(decoder.stop_now());
        assert_eq!(decoder.statistics().ignored_after_stop, 1);
        assert!(decoder.sink().dictionary.is_empty());

        // Re-initialising does not lift the stop
        decoder.init(0, 10, "data01.example.org:1094").unwrap();
        assert!(decoder.stop_now());

        decoder.reset();
        assert!(!decoder.stop_now());
        assert_eq!(decoder.phase(), DecoderPhase::Uninitialized);
        assert_eq!(decoder.statistics().ignored_after_stop, 0);
        // Traces accepted before the stop still belong to the sink
        assert_eq!(decoder.sink().traces.len(), 3);
        assert_eq!(decoder.last_seq(), Some(0));
    }

    #[test]
    fn test_reset_then_init_accepts_previously_rejected_id() {
        let mut decoder = PacketDecoder::with_sink(MemorySink::new(), DecoderMode::RealTime);
        decoder.init(1, 10, "data01.example.org:1094").unwrap();
        let mut builder = PacketBuilder::new(0);

        let report = decoder
            .decode_raw(&builder.dictionary(50, "/store/late.root"), None)
            .unwrap();
        assert_eq!(report.forwarded, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(decoder.statistics().out_of_range_ids, 1);

        decoder.reset();
        decoder.init(40, 60, "data01.example.org:1094").unwrap();

        let report = decoder
            .decode_raw(&builder.dictionary(50, "/store/late.root"), None)
            .unwrap();
        assert_eq!(report.forwarded, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(decoder.statistics().out_of_range_ids, 0);
        assert_eq!(decoder.sink().dictionary.len(), 1);
        assert_eq!(decoder.sink().dictionary[0].1.dict_id, 50);
    }

    #[test]
    fn test_stop_token_observed_by_driver() {
        let mut decoder = real_time_decoder();
        let token = decoder.stop_token();
        token.cancel();

        let packet = PacketBuilder::new(0).dictionary(1, "/f");
        let report = decoder.decode_raw(&packet, None).unwrap();
        assert_eq!(report.outcome, PacketOutcome::IgnoredStopped);
        assert_eq!(decoder.phase(), DecoderPhase::Stopped);
    }

    #[test]
    fn test_decode_after_reset_requires_init() {
        let mut decoder = real_time_decoder();
        decoder.reset();
        let packet = PacketBuilder::new(0).dictionary(1, "/f");
        assert!(decoder.decode_raw(&packet, None).is_err());
    }

    #[test]
    fn test_flushes_reach_the_sink() {
        let mut decoder = real_time_decoder();
        decoder.flush_real_time_data().unwrap();
        decoder.flush_history_data().unwrap();
        decoder.flush_history_data().unwrap();
        let sink = decoder.into_sink();
        assert_eq!(sink.real_time_flushes, 1);
        assert_eq!(sink.history_flushes, 2);
        assert_eq!(Sink::last_seq(&sink), None);
    }
}
