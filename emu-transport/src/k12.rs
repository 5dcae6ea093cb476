//! Frame dumps in the K12 text format Wireshark imports.

use std::io::{self, Write};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

/// Writes every frame it is shown, timestamped from the monitor's creation.
pub struct K12Monitor {
    out: Box<dyn Write + Send>,
    start: Instant,
}

impl K12Monitor {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        K12Monitor {
            out,
            start: Instant::now(),
        }
    }

    pub fn stdout() -> Self {
        K12Monitor::new(Box::new(io::stdout()))
    }

    pub fn dump(&mut self, direction: Direction, vport: u16, frame: &[u8]) -> io::Result<()> {
        let elapsed = self.start.elapsed();
        write_k12(&mut self.out, elapsed, direction, vport, frame)
    }
}

pub fn write_k12<W: Write + ?Sized>(
    out: &mut W,
    elapsed: Duration,
    direction: Direction,
    vport: u16,
    frame: &[u8],
) -> io::Result<()> {
    let secs = elapsed.as_secs();
    let micros = elapsed.subsec_micros();
    let marker = match direction {
        Direction::Tx => "->TX->",
        Direction::Rx => "<-RX<-",
    };
    writeln!(out, "\n {} vport {}", marker, vport)?;
    writeln!(out, "+---------+---------------+----------+")?;
    writeln!(
        out,
        "{:02}:{:02}:{:02},{:03},{:03}   ETHER",
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60,
        micros / 1000,
        micros % 1000
    )?;
    write!(out, "|0   |")?;
    for byte in frame {
        write!(out, "{:02x}|", byte)?;
    }
    writeln!(out)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format() {
        let mut out = Vec::new();
        write_k12(
            &mut out,
            Duration::new(3723, 4_005_000),
            Direction::Rx,
            2,
            &[0xff, 0x00, 0x1a],
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "\n <-RX<- vport 2\n\
             +---------+---------------+----------+\n\
             01:02:03,004,005   ETHER\n\
             |0   |ff|00|1a|\n"
        );
    }
}
