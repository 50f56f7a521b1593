/// The eight states of the IDSCP2 handshake/steady-state/teardown FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    WaitForHello,
    WaitForRat,
    WaitForRatProver,
    WaitForRatVerifier,
    WaitForDatAndRat,
    WaitForDatAndRatVerifier,
    Established,
}

impl ConnectionState {
    pub fn is_established(self) -> bool {
        matches!(self, ConnectionState::Established)
    }

    pub fn is_closed(self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}
