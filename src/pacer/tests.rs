// src/pacer/tests.rs

use super::*;
use std::io::Cursor;

fn schedule(baud: u32) -> RateSchedule {
    RateSchedule::from_bits_per_second(baud).expect("baud in range")
}

/// A reader that hands out pre-recorded chunks, one per call.
struct ChunkedReader {
    chunks: Vec<io::Result<Vec<u8>>>,
}

impl ChunkedReader {
    fn new(chunks: Vec<io::Result<Vec<u8>>>) -> Self {
        let mut chunks = chunks;
        chunks.reverse();
        Self { chunks }
    }
}

impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.chunks.pop() {
            Some(Ok(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.chunks.push(Ok(bytes[n..].to_vec()));
                }
                Ok(n)
            }
            Some(Err(e)) => Err(e),
            None => Ok(0),
        }
    }
}

/// A display whose writes always fail.
struct BrokenDisplay;

impl Write for BrokenDisplay {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "line dropped"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Counts flushes so tests can check every tick flushes.
#[derive(Default)]
struct FlushCounter {
    bytes: Vec<u8>,
    flushes: usize,
}

impl Write for FlushCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

#[test_log::test]
fn slowest_rate_stretches_the_tick_and_sends_one_byte() {
    let s = schedule(150);
    assert_eq!(s.tick_interval_ms(), 67);
    assert_eq!(s.emission_budget(), 1);
}

#[test_log::test]
fn fastest_rate_pins_the_tick_to_the_frame() {
    let s = schedule(200_000);
    assert_eq!(s.tick_interval_ms(), 17);
    assert_eq!(s.emission_budget(), 333);
}

#[test_log::test]
fn common_rates() {
    // 300 baud: 33.3ms per byte, slower than a frame.
    let s = schedule(300);
    assert_eq!((s.tick_interval_ms(), s.emission_budget()), (34, 1));

    // 9600 baud: 960 bytes/s, 16 bytes per frame.
    let s = schedule(9600);
    assert_eq!((s.tick_interval_ms(), s.emission_budget()), (17, 16));

    // 6000 baud divides evenly: exactly 10 bytes per frame.
    let s = schedule(6000);
    assert_eq!((s.tick_interval_ms(), s.emission_budget()), (17, 10));
}

#[test_log::test]
fn rates_outside_the_line_limits_are_rejected() {
    for baud in [0, 149, 200_001, u32::MAX] {
        assert_eq!(
            RateSchedule::from_bits_per_second(baud),
            Err(RateError::OutOfRange {
                requested: baud,
                min: 150,
                max: 200_000
            })
        );
    }
    let err = RateSchedule::from_bits_per_second(100).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Minimum baudrate is 150 and maximum is 200000."
    );
}

#[test_log::test]
fn every_valid_rate_yields_positive_interval_and_budget_near_target() {
    let line = LineConfig::default();
    let mut rates: Vec<u32> = (line.min_baud..=line.max_baud).step_by(97).collect();
    rates.push(line.max_baud);

    for baud in rates {
        let s = schedule(baud);
        assert!(s.tick_interval_ms() >= 1, "baud {}", baud);
        assert!(s.emission_budget() >= 1, "baud {}", baud);

        let target = baud as f64 / 10.0;
        let delivered = s.delivered_bytes_per_second();
        let budget = s.emission_budget() as f64;
        // Never faster than the line, and never slower than losing the
        // fractional byte per frame allows.
        assert!(
            delivered <= target,
            "baud {}: delivered {} > target {}",
            baud,
            delivered,
            target
        );
        assert!(
            delivered >= target * budget / (budget + 1.0) * 0.95,
            "baud {}: delivered {} too far below target {}",
            baud,
            delivered,
            target
        );
    }
}

#[test_log::test]
fn custom_line_framing_changes_the_schedule() {
    // 7 data bits, one stop bit: 9 bit-times per byte, on a 30Hz display.
    let line = LineConfig {
        bits_per_byte: 9,
        reference_fps: 30,
        ..LineConfig::default()
    };
    let s = RateSchedule::new(9000, &line).unwrap();
    assert_eq!(s.tick_interval_ms(), 34);
    assert_eq!(s.emission_budget(), 33);
}

#[test_log::test]
fn no_rate_outpaces_the_line() {
    let line = LineConfig::default();
    for baud in line.min_baud..=line.max_baud {
        let s = schedule(baud);
        let byte_time_ms = 1000.0 * f64::from(line.bits_per_byte) / f64::from(baud);
        if s.emission_budget() == 1 {
            assert!(
                s.tick_interval_ms() as f64 >= byte_time_ms,
                "baud {}: tick {}ms is shorter than one byte ({}ms)",
                baud,
                s.tick_interval_ms(),
                byte_time_ms
            );
        }
        assert!(
            s.delivered_bytes_per_second() <= f64::from(baud) / 10.0,
            "baud {}: {} B/s",
            baud,
            s.delivered_bytes_per_second()
        );
    }
    // 151 baud is 66.2ms per byte.
    assert_eq!(schedule(151).tick_interval_ms(), 67);
}

#[test_log::test]
fn zero_framing_is_an_error_not_a_panic() {
    let no_bits = LineConfig {
        bits_per_byte: 0,
        ..LineConfig::default()
    };
    assert_eq!(
        RateSchedule::new(9600, &no_bits),
        Err(RateError::ZeroFraming {
            field: "bits_per_byte"
        })
    );
    let no_frames = LineConfig {
        reference_fps: 0,
        ..LineConfig::default()
    };
    assert_eq!(
        RateSchedule::new(9600, &no_frames),
        Err(RateError::ZeroFraming {
            field: "reference_fps"
        })
    );
}

#[test_log::test]
fn banner_line_reports_budget_and_interval() {
    assert_eq!(
        schedule(150).to_string(),
        "Writing 1 characters every 67 ms."
    );
}

#[test_log::test]
fn tick_drains_at_most_one_budget() {
    let mut pacer = Pacer::new(schedule(9600));
    pacer.enqueue(b"abcdefghijklmnopqrstuvwxyz");

    let mut display = Vec::new();
    assert_eq!(pacer.on_timer_tick(&mut display).unwrap(), 16);
    assert_eq!(display, b"abcdefghijklmnop");
    assert_eq!(pacer.pending(), 10);

    assert_eq!(pacer.on_timer_tick(&mut display).unwrap(), 10);
    assert_eq!(display, b"abcdefghijklmnopqrstuvwxyz");
    assert!(pacer.is_drained());
}

#[test_log::test]
fn full_drain_truncates_logically_but_keeps_capacity() {
    let mut pacer = Pacer::new(schedule(200_000));
    pacer.enqueue(&[b'x'; 100]);
    let capacity = pacer.capacity();

    let mut display = Vec::new();
    pacer.on_timer_tick(&mut display).unwrap();
    assert_eq!(pacer.read_cursor(), 0);
    assert_eq!(pacer.write_length(), 0);
    assert_eq!(pacer.capacity(), capacity);
}

#[test_log::test]
fn tick_on_empty_pacer_changes_nothing() {
    let mut pacer = Pacer::new(schedule(1200));
    let mut display = FlushCounter::default();

    assert_eq!(pacer.on_timer_tick(&mut display).unwrap(), 0);
    pacer.enqueue(b"hi");
    pacer.on_timer_tick(&mut display).unwrap();
    let after_drain = (pacer.read_cursor(), pacer.write_length(), pacer.capacity());

    assert_eq!(pacer.on_timer_tick(&mut display).unwrap(), 0);
    assert_eq!(
        (pacer.read_cursor(), pacer.write_length(), pacer.capacity()),
        after_drain
    );
    assert_eq!(display.bytes, b"hi");
    assert_eq!(display.flushes, 3);
}

#[test_log::test]
fn bytes_come_out_in_read_order_however_ticks_split_them() {
    let chunks: Vec<Vec<u8>> = vec![
        b"first chunk\r\n".to_vec(),
        (0u8..=255).collect(),
        b"x".to_vec(),
        vec![b'y'; 5000],
        b"tail".to_vec(),
    ];
    let expected: Vec<u8> = chunks.concat();

    for baud in [150, 2400, 38_400, 200_000] {
        let mut pacer = Pacer::with_sizes(schedule(baud), 16, 4096);
        let mut reader = ChunkedReader::new(chunks.iter().cloned().map(Ok).collect());
        let mut display = Vec::new();

        // Interleave intake with ticks so draining straddles chunk edges.
        while pacer.on_pty_readable(&mut reader).is_ok() {
            pacer.on_timer_tick(&mut display).unwrap();
        }
        while !pacer.is_drained() {
            pacer.on_timer_tick(&mut display).unwrap();
        }
        assert_eq!(display, expected, "baud {}", baud);
    }
}

#[test_log::test]
fn growth_keeps_undisplayed_bytes_intact() {
    let mut pacer = Pacer::with_sizes(schedule(2400), 8, 4096);
    pacer.enqueue(b"0123456789");
    assert_eq!(pacer.capacity(), 16);

    let mut display = Vec::new();
    pacer.on_timer_tick(&mut display).unwrap(); // budget 4
    assert_eq!(display, b"0123");
    assert_eq!(pacer.pending_bytes(), b"456789");

    let big: Vec<u8> = (0..100u8).collect();
    pacer.enqueue(&big);
    assert_eq!(pacer.capacity(), 128);

    let mut expected = b"456789".to_vec();
    expected.extend_from_slice(&big);
    assert_eq!(pacer.pending_bytes(), &expected[..]);
}

#[test_log::test]
fn capacity_doubles_from_the_initial_size() {
    let mut pacer = Pacer::with_sizes(schedule(2400), 4096, 4096);
    assert_eq!(pacer.capacity(), 0);
    pacer.enqueue(&[0; 10]);
    assert_eq!(pacer.capacity(), 4096);
    pacer.enqueue(&[0; 4096]);
    assert_eq!(pacer.capacity(), 8192);
    pacer.enqueue(&[0; 10_000]);
    assert_eq!(pacer.capacity(), 16_384);
}

#[test_log::test]
fn end_of_file_fails_the_pty_source() {
    let mut pacer = Pacer::new(schedule(9600));
    let mut empty = Cursor::new(Vec::<u8>::new());
    assert!(matches!(
        pacer.on_pty_readable(&mut empty),
        Err(SourceError::Eof)
    ));
}

#[test_log::test]
fn read_error_fails_the_pty_source_but_would_block_does_not() {
    let mut pacer = Pacer::new(schedule(9600));
    let mut reader = ChunkedReader::new(vec![
        Err(io::Error::from(io::ErrorKind::WouldBlock)),
        Err(io::Error::from(io::ErrorKind::Interrupted)),
        Err(io::Error::new(io::ErrorKind::Other, "EIO")),
    ]);
    assert_eq!(pacer.on_pty_readable(&mut reader).unwrap(), 0);
    assert_eq!(pacer.on_pty_readable(&mut reader).unwrap(), 0);
    assert!(matches!(
        pacer.on_pty_readable(&mut reader),
        Err(SourceError::Io(_))
    ));
    assert!(pacer.is_drained());
}

#[test_log::test]
fn reads_are_capped_at_the_chunk_size() {
    let mut pacer = Pacer::with_sizes(schedule(9600), 4096, 4096);
    let mut reader = Cursor::new(vec![b'z'; 10_000]);
    assert_eq!(pacer.on_pty_readable(&mut reader).unwrap(), 4096);
    assert_eq!(pacer.pending(), 4096);
}

#[test_log::test]
fn display_failure_surfaces_from_the_tick() {
    let mut pacer = Pacer::new(schedule(9600));
    pacer.enqueue(b"lost");
    let err = pacer.on_timer_tick(&mut BrokenDisplay).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    assert_eq!(pacer.pending_bytes(), b"lost");
}
