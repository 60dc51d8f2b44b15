use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReceiverSet {
    /// Every participant, the sender included.
    All = 0,
    Server = 1,
    /// Everyone but the sender. The server counts when a client sends.
    Others = 2,
    Owner = 3,
    AllBuffered = 4,
    OthersBuffered = 5,
}

impl ReceiverSet {
    pub fn is_buffered(self) -> bool {
        matches!(self, Self::AllBuffered | Self::OthersBuffered)
    }

    pub fn unbuffered(self) -> Self {
        match self {
            Self::AllBuffered => Self::All,
            Self::OthersBuffered => Self::Others,
            other => other,
        }
    }

    pub fn includes_sender(self) -> bool {
        matches!(self.unbuffered(), Self::All)
    }
}

impl fmt::Display for ReceiverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::All => "all",
            Self::Server => "server",
            Self::Others => "others",
            Self::Owner => "owner",
            Self::AllBuffered => "all-buffered",
            Self::OthersBuffered => "others-buffered",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown receiver set tag {0}")]
pub struct UnknownReceiverSet(pub u8);

impl TryFrom<u8> for ReceiverSet {
    type Error = UnknownReceiverSet;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            0 => Self::All,
            1 => Self::Server,
            2 => Self::Others,
            3 => Self::Owner,
            4 => Self::AllBuffered,
            5 => Self::OthersBuffered,
            other => return Err(UnknownReceiverSet(other)),
        })
    }
}

impl From<ReceiverSet> for u8 {
    fn from(set: ReceiverSet) -> Self {
        set as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_stable() {
        for tag in 0..=5u8 {
            let set = ReceiverSet::try_from(tag).unwrap();
            assert_eq!(u8::from(set), tag);
        }
        assert_eq!(ReceiverSet::try_from(6), Err(UnknownReceiverSet(6)));
    }

    #[test]
    fn buffered_forms_route_like_plain() {
        assert_eq!(ReceiverSet::AllBuffered.unbuffered(), ReceiverSet::All);
        assert!(ReceiverSet::AllBuffered.includes_sender());
        assert!(!ReceiverSet::OthersBuffered.includes_sender());
        assert!(!ReceiverSet::Server.is_buffered());
    }
}
