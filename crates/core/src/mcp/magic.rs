//! The magic server: region-of-interest markers and per-core clock control,
//! mirroring `magic_client.cc`'s `MAGIC_ROI_START`/`MAGIC_ROI_END`/
//! `MAGIC_SET_MHZ`/`MAGIC_GET_MHZ` operations.

use std::collections::HashMap;

use crate::common::CoreId;
use crate::net::message::{MagicRequest, MagicResponse};

/// Tracks the region-of-interest flag and each core's current clock
/// frequency, as set through the magic interface.
#[derive(Debug)]
pub struct MagicServer {
    in_roi: bool,
    mhz: HashMap<CoreId, u32>,
    default_mhz: u32,
}

impl MagicServer {
    /// Builds a magic server with every core starting at `default_mhz`.
    #[must_use]
    pub fn new(default_mhz: u32) -> Self {
        Self {
            in_roi: false,
            mhz: HashMap::new(),
            default_mhz,
        }
    }

    /// Whether the simulation is currently inside its region of interest.
    #[must_use]
    pub const fn in_roi(&self) -> bool {
        self.in_roi
    }

    /// The clock frequency of `core`, in MHz.
    #[must_use]
    pub fn mhz_of(&self, core: CoreId) -> u32 {
        self.mhz.get(&core).copied().unwrap_or(self.default_mhz)
    }

    /// Handles one [`MagicRequest`].
    pub fn handle(&mut self, request: MagicRequest) -> MagicResponse {
        match request {
            MagicRequest::RoiBegin => {
                self.in_roi = true;
                MagicResponse::Ack
            }
            MagicRequest::RoiEnd => {
                self.in_roi = false;
                MagicResponse::Ack
            }
            MagicRequest::SetMhz { core, mhz } => {
                self.mhz.insert(core, mhz);
                MagicResponse::Ack
            }
            MagicRequest::GetMhz { core } => MagicResponse::Mhz(self.mhz_of(core)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roi_toggles_on_begin_and_end() {
        let mut magic = MagicServer::new(1000);
        assert!(!magic.in_roi());
        magic.handle(MagicRequest::RoiBegin);
        assert!(magic.in_roi());
        magic.handle(MagicRequest::RoiEnd);
        assert!(!magic.in_roi());
    }

    #[test]
    fn unset_core_reports_the_default_clock() {
        let magic = MagicServer::new(2000);
        assert_eq!(magic.mhz_of(CoreId::new(3)), 2000);
    }

    #[test]
    fn set_mhz_then_get_mhz_round_trips() {
        let mut magic = MagicServer::new(1000);
        magic.handle(MagicRequest::SetMhz { core: CoreId::new(1), mhz: 3200 });
        let response = magic.handle(MagicRequest::GetMhz { core: CoreId::new(1) });
        assert_eq!(response, MagicResponse::Mhz(3200));
    }
}
