use dtl_hostif::{
    Attribute, BoardConfig, BoardId, BoardSession, Channel, RamWindow, HOST_IF_BUFSIZE,
};
use proptest::prelude::*;

const BYTE_REGISTERS: [Attribute; 5] = [
    Attribute::Bootp,
    Attribute::Stat,
    Attribute::Dipsw,
    Attribute::Ffe,
    Attribute::Fff,
];

fn session() -> BoardSession<RamWindow> {
    BoardSession::new(
        BoardId::new(0, 1, 0, 0),
        BoardConfig::default(),
        RamWindow::new(),
    )
}

#[test]
fn every_byte_value_reads_back() {
    let s = session();
    for attr in BYTE_REGISTERS {
        for v in 0..=255u8 {
            s.store(attr, format!("{v}\n").as_bytes()).unwrap();
            assert_eq!(s.show(attr).unwrap(), format!("{v}\n").into_bytes(), "{attr}={v}");
            assert_eq!(s.read_register(attr).unwrap(), v);
        }
    }
}

#[test]
fn out_of_range_values_are_rejected() {
    let s = session();
    for attr in BYTE_REGISTERS {
        s.store(attr, b"17").unwrap();
        for input in ["256", "1000", "4294967296", "-3", "0x1f", "seventeen", ""] {
            let err = s.store(attr, input.as_bytes()).unwrap_err();
            assert!(err.is_invalid_argument(), "{attr} <- {input:?}: {err}");
            assert_eq!(s.read_register(attr).unwrap(), 17);
        }
    }
}

#[test]
fn reset_trigger_rejects_anything_but_one() {
    let s = session();
    s.store(Attribute::Bootp, b"0").unwrap();
    s.store(Attribute::Stat, b"3").unwrap();
    for input in ["0", "2", "11", "one", " "] {
        assert!(s.store(Attribute::Reset, input.as_bytes()).is_err());
    }
    assert_eq!(s.read_register(Attribute::Bootp).unwrap(), 0);
    assert_eq!(s.read_register(Attribute::Stat).unwrap(), 3);

    s.store(Attribute::Reset, b"1").unwrap();
    assert_eq!(s.read_register(Attribute::Bootp).unwrap(), 1);
    assert_eq!(s.read_register(Attribute::Stat).unwrap(), 0xa0);
}

#[test]
fn wrong_length_buffer_write_keeps_contents() {
    let s = session();
    let block: Vec<u8> = (0..HOST_IF_BUFSIZE).map(|i| i as u8).collect();
    s.store(Attribute::BufferA, &block).unwrap();
    s.store(Attribute::BufferB, &block).unwrap();

    for len in [0, 1, 512, HOST_IF_BUFSIZE - 1, HOST_IF_BUFSIZE + 1, 4096] {
        let junk = vec![0xee; len];
        assert!(s.store(Attribute::BufferA, &junk).is_err());
        assert!(s.store(Attribute::BufferB, &junk).is_err());
    }
    assert_eq!(s.show(Attribute::BufferA).unwrap(), block);
    assert_eq!(s.show(Attribute::BufferB).unwrap(), block);
}

#[test]
fn buffer_write_reads_back_unchanged() {
    let s = session();
    s.reset();
    let block: Vec<u8> = (0..HOST_IF_BUFSIZE)
        .map(|i| (i * 7 + 3) as u8)
        .collect();
    assert_eq!(s.store(Attribute::BufferA, &block).unwrap(), HOST_IF_BUFSIZE);
    assert_eq!(s.read_buffer(Channel::A).as_slice(), block.as_slice());
    // Channel B untouched by a channel A write.
    assert!(s.read_buffer(Channel::B).iter().all(|&b| b == 0));
}

#[test]
fn interrupt_service_twice_is_stable() {
    let s = session();
    s.store(Attribute::Stat, b"249").unwrap();
    let first = s.handle_irq();
    let second = s.handle_irq();
    assert_eq!(first.after.stat, 249 & 0x0f);
    assert_eq!(second.after, first.after);
    assert_eq!(s.read_register(Attribute::Stat).unwrap(), 249 & 0x0f);
}

proptest! {
    #[test]
    fn numeric_store_is_all_or_nothing(input in "\\PC{0,6}|[ +]?[0-9]{1,4}\n?", reg in 0usize..5) {
        let attr = BYTE_REGISTERS[reg];
        let s = session();
        s.write_register(attr, 0x5a).unwrap();

        let trimmed = input.trim_matches(|c: char| c.is_ascii_whitespace());
        let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
        let expected = (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .then(|| digits.parse::<u8>().ok())
            .flatten();

        match s.store(attr, input.as_bytes()) {
            Ok(n) => {
                prop_assert_eq!(n, input.len());
                prop_assert_eq!(Some(s.read_register(attr).unwrap()), expected);
            }
            Err(err) => {
                prop_assert!(err.is_invalid_argument());
                prop_assert_eq!(expected, None);
                prop_assert_eq!(s.read_register(attr).unwrap(), 0x5a);
            }
        }
    }
}
