//! The closed set of wire commands.

use std::fmt;

/// A protocol command, one per line keyword.
///
/// The discriminants index [`FieldState`](super::FieldState) tables, so the
/// order here is the table layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Idt,
    Sha,
    Act,
    Llh,
    Beg,
    End,
    Hdg,
    Len,
    Lim,
    Met,
    Mim,
    Pjt,
    Pro,
    Rad,
    Shp,
    Wid,
    Dat,
    Uid,
    Dbg,
    Nop,
    Bye,
    Dot,
}

impl Command {
    /// Number of commands; the size of a field table.
    pub const COUNT: usize = 22;

    /// All commands in table order.
    pub const ALL: [Command; Self::COUNT] = [
        Command::Idt,
        Command::Sha,
        Command::Act,
        Command::Llh,
        Command::Beg,
        Command::End,
        Command::Hdg,
        Command::Len,
        Command::Lim,
        Command::Met,
        Command::Mim,
        Command::Pjt,
        Command::Pro,
        Command::Rad,
        Command::Shp,
        Command::Wid,
        Command::Dat,
        Command::Uid,
        Command::Dbg,
        Command::Nop,
        Command::Bye,
        Command::Dot,
    ];

    /// Parses a command keyword, ignoring case.
    pub fn parse(keyword: &str) -> Option<Self> {
        if keyword == "." {
            return Some(Command::Dot);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|cmd| *cmd != Command::Dot && cmd.name().eq_ignore_ascii_case(keyword))
    }

    /// Uppercase wire name, as used in rejection lists.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Idt => "IDT",
            Command::Sha => "SHA",
            Command::Act => "ACT",
            Command::Llh => "LLH",
            Command::Beg => "BEG",
            Command::End => "END",
            Command::Hdg => "HDG",
            Command::Len => "LEN",
            Command::Lim => "LIM",
            Command::Met => "MET",
            Command::Mim => "MIM",
            Command::Pjt => "PJT",
            Command::Pro => "PRO",
            Command::Rad => "RAD",
            Command::Shp => "SHP",
            Command::Wid => "WID",
            Command::Dat => "DAT",
            Command::Uid => "UID",
            Command::Dbg => "DBG",
            Command::Nop => "NOP",
            Command::Bye => "BYE",
            Command::Dot => ".",
        }
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
