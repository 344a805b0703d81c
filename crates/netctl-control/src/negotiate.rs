use netctl_virtchnl::{
    Capabilities, MailboxTransport, Opcode, VersionInfo, VERSION_MAJOR, VERSION_MINOR,
};
use tracing::{error, info};

use crate::adapter::{Adapter, NegotiationState};
use crate::engine::CommandInfo;
use crate::error::{CtlError, Result};

impl<T: MailboxTransport> Adapter<T> {
    /// Step one of startup: exchange protocol versions.
    ///
    /// Firmware must report our major version and at least our minor version.
    pub fn check_api_version(&mut self) -> Result<VersionInfo> {
        let args = VersionInfo::current().encode();
        let resp = self.engine.execute(CommandInfo::new(
            Opcode::Version,
            &args,
            VersionInfo::LEN,
        ))?;
        let version = VersionInfo::decode(&resp)
            .map_err(|e| CtlError::protocol(format!("bad version reply: {e}")))?;

        if version.major != VERSION_MAJOR || version.minor < VERSION_MINOR {
            error!(
                adapter = %self.id,
                major = version.major,
                minor = version.minor,
                "incompatible control channel version"
            );
            return Err(CtlError::protocol(format!(
                "firmware speaks {}.{}, expected {VERSION_MAJOR}.{VERSION_MINOR}",
                version.major, version.minor
            )));
        }

        self.version = Some(version);
        if self.state == NegotiationState::Fresh {
            self.state = NegotiationState::VersionChecked;
        }
        Ok(version)
    }

    /// Step two of startup: fetch and record the capability set, and size the port table.
    ///
    /// Fails without a round-trip if the version check has not succeeded yet.
    pub fn get_caps(&mut self) -> Result<Capabilities> {
        if self.state == NegotiationState::Fresh {
            return Err(CtlError::protocol(
                "capability query issued before version check",
            ));
        }

        let args = Capabilities::requested().encode();
        let resp = self.engine.execute(CommandInfo::new(
            Opcode::GetCaps,
            &args,
            Capabilities::LEN,
        ))?;
        let caps = Capabilities::decode(&resp)
            .map_err(|e| CtlError::protocol(format!("bad capabilities reply: {e}")))?;

        // The table is sized once; a later re-query only refreshes the capability record.
        if self.cur_vport_nb == 0 {
            self.max_vport_nb = caps.max_vports.min(self.config.max_vports);
            self.vports = vec![None; self.max_vport_nb as usize];
        }
        self.caps = Some(caps);
        self.state = NegotiationState::Ready;

        info!(
            adapter = %self.id,
            max_vports = self.max_vport_nb,
            max_tx_q = caps.max_tx_q,
            max_rx_q = caps.max_rx_q,
            "capabilities negotiated"
        );
        Ok(caps)
    }

    /// Run the full startup sequence.
    pub fn init(&mut self) -> Result<()> {
        self.check_api_version()?;
        self.get_caps()?;
        Ok(())
    }
}
