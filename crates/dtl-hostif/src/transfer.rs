//! Host interface buffer transfers.
//!
//! A transfer fills one of the two 1020-byte buffers a byte at a time, rings the `FFF` doorbell
//! and then nudges `STAT.IRQ_ACK`. It does not wait for the target; completion arrives later as
//! an interrupt (see [`crate::irq`]).

use core::fmt;

use crate::error::{Error, Result};
use crate::regs::{
    Stat, HOST_IF_BUFSIZE, REG_BUF_800, REG_BUF_C00, REG_STAT, STAT_CHANNEL_B_PRECLEAR_MASK,
};
use crate::window::RegisterWindow;

/// One of the two host interface buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Buffer at `0x800` ("eight").
    A,
    /// Buffer at `0xC00` ("cee").
    B,
}

impl Channel {
    /// BAR0 offset of the first buffer byte.
    pub const fn base(self) -> usize {
        match self {
            Channel::A => REG_BUF_800,
            Channel::B => REG_BUF_C00,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Channel::A => "eight",
            Channel::B => "cee",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Copies `data` into `channel` and signals the target.
///
/// `data` must be exactly [`HOST_IF_BUFSIZE`] bytes; anything else is rejected before the
/// window is touched.
pub fn transfer<W: RegisterWindow + ?Sized>(
    win: &mut W,
    channel: Channel,
    data: &[u8],
) -> Result<()> {
    if data.len() != HOST_IF_BUFSIZE {
        return Err(Error::InvalidBufferLength {
            len: data.len(),
            expected: HOST_IF_BUFSIZE,
        });
    }

    if channel == Channel::B {
        let stat = win.stat();
        win.set_stat(stat & STAT_CHANNEL_B_PRECLEAR_MASK);
    }

    let base = channel.base();
    for (i, &byte) in data.iter().enumerate() {
        win.write_u8(base + i, byte);
    }

    win.set_fff(1);

    // The write-back uses a second STAT read, never the value tested above.
    let nudged = if win.stat() & Stat::IRQ_ACK.bits() != 0 {
        let stat = win.read_u8(REG_STAT);
        win.set_stat(stat | Stat::IRQ_ACK.bits());
        true
    } else {
        false
    };

    tracing::trace!(%channel, nudged, "host interface buffer queued");
    Ok(())
}

/// Reads back the full contents of `channel`, lowest offset first.
pub fn read_buffer<W: RegisterWindow + ?Sized>(
    win: &mut W,
    channel: Channel,
) -> [u8; HOST_IF_BUFSIZE] {
    let mut out = [0u8; HOST_IF_BUFSIZE];
    let base = channel.base();
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = win.read_u8(base + i);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::REG_FFF;
    use crate::window::{Access, RamWindow, RecordingWindow};

    fn pattern(seed: u8) -> Vec<u8> {
        (0..HOST_IF_BUFSIZE)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
            .collect()
    }

    #[test]
    fn wrong_length_touches_nothing() {
        let mut win = RecordingWindow::new(RamWindow::new());
        for len in [0, 1, HOST_IF_BUFSIZE - 1, HOST_IF_BUFSIZE + 1] {
            let err = transfer(&mut win, Channel::A, &vec![0xff; len]).unwrap_err();
            assert!(matches!(err, Error::InvalidBufferLength { len: l, .. } if l == len));
            let err = transfer(&mut win, Channel::B, &vec![0xff; len]).unwrap_err();
            assert!(err.is_invalid_argument());
        }
        assert!(win.accesses().is_empty());
    }

    #[test]
    fn channel_a_sequence_without_nudge() {
        let data = pattern(3);
        let mut win = RecordingWindow::new(RamWindow::new());
        transfer(&mut win, Channel::A, &data).unwrap();

        let log = win.accesses();
        assert_eq!(log.len(), HOST_IF_BUFSIZE + 2);
        for (i, access) in log[..HOST_IF_BUFSIZE].iter().enumerate() {
            assert_eq!(
                *access,
                Access::Write8 {
                    offset: REG_BUF_800 + i,
                    value: data[i]
                }
            );
        }
        assert_eq!(
            log[HOST_IF_BUFSIZE],
            Access::Write8 {
                offset: REG_FFF,
                value: 1
            }
        );
        assert_eq!(
            log[HOST_IF_BUFSIZE + 1],
            Access::Read8 {
                offset: REG_STAT,
                value: 0
            }
        );
    }

    #[test]
    fn channel_b_preclears_stat_and_nudges() {
        let data = pattern(9);
        let mut ram = RamWindow::new();
        ram.set_stat(0xff);
        let mut win = RecordingWindow::new(ram);

        transfer(&mut win, Channel::B, &data).unwrap();
        let log = win.take_accesses();

        assert_eq!(
            &log[..2],
            &[
                Access::Read8 {
                    offset: REG_STAT,
                    value: 0xff
                },
                Access::Write8 {
                    offset: REG_STAT,
                    value: 0xa0
                },
            ]
        );
        // 0xa0 has bit 2 clear, so no nudge.
        assert_eq!(log.len(), 2 + HOST_IF_BUFSIZE + 2);
        assert_eq!(log[2].offset(), REG_BUF_C00);
        assert_eq!(log[2 + HOST_IF_BUFSIZE - 1].offset(), REG_BUF_C00 + HOST_IF_BUFSIZE - 1);
    }

    #[test]
    fn nudge_rereads_and_writes_back_with_irq_ack() {
        let mut ram = RamWindow::new();
        ram.set_stat(0x04);
        let mut win = RecordingWindow::new(ram);

        transfer(&mut win, Channel::A, &pattern(0)).unwrap();
        let log = win.accesses();
        let tail = &log[log.len() - 4..];
        assert_eq!(
            tail,
            &[
                Access::Write8 {
                    offset: REG_FFF,
                    value: 1
                },
                Access::Read8 {
                    offset: REG_STAT,
                    value: 0x04
                },
                Access::Read8 {
                    offset: REG_STAT,
                    value: 0x04
                },
                Access::Write8 {
                    offset: REG_STAT,
                    value: 0x04
                },
            ]
        );
    }

    #[test]
    fn read_back_matches_written_block() {
        let mut win = RamWindow::new();
        let a = pattern(1);
        let b = pattern(2);
        transfer(&mut win, Channel::A, &a).unwrap();
        transfer(&mut win, Channel::B, &b).unwrap();
        assert_eq!(read_buffer(&mut win, Channel::A).as_slice(), a.as_slice());
        assert_eq!(read_buffer(&mut win, Channel::B).as_slice(), b.as_slice());
    }
}
