//! Broadcast server settings read from `ytsconfig::Config`

use ytsconfig::Config;

use crate::BroadcastOptions;

const DEFAULT_BIND_ATTEMPTS: u16 = 10;
const DEFAULT_LISTENER_CAPACITY: usize = 1024;
const DEFAULT_PAGE_REFRESH_SECS: u64 = 30;

/// Extension trait for the broadcast server settings
pub trait BroadcastConfigExt {
    /// Number of consecutive ports tried at startup (`server.bind_attempts`)
    fn get_bind_attempts(&self) -> u16;

    /// Per-listener chunk buffer (`server.listener_capacity`)
    fn get_listener_capacity(&self) -> usize;

    /// Player page refresh period (`server.page_refresh_secs`)
    fn get_page_refresh_secs(&self) -> u64;

    /// All server options, host values included
    fn broadcast_options(&self) -> BroadcastOptions;
}

impl BroadcastConfigExt for Config {
    fn get_bind_attempts(&self) -> u16 {
        let raw = self.get_u64_or(&["server", "bind_attempts"], u64::from(DEFAULT_BIND_ATTEMPTS));
        u16::try_from(raw).unwrap_or(DEFAULT_BIND_ATTEMPTS).max(1)
    }

    fn get_listener_capacity(&self) -> usize {
        self.get_usize_or(&["server", "listener_capacity"], DEFAULT_LISTENER_CAPACITY)
            .max(1)
    }

    fn get_page_refresh_secs(&self) -> u64 {
        self.get_u64_or(&["server", "page_refresh_secs"], DEFAULT_PAGE_REFRESH_SECS)
            .max(1)
    }

    fn broadcast_options(&self) -> BroadcastOptions {
        BroadcastOptions {
            name: self.get_host_name(),
            bind_address: self.get_bind_address(),
            port: self.get_http_port(),
            bind_attempts: self.get_bind_attempts(),
            listener_capacity: self.get_listener_capacity(),
            page_refresh_secs: self.get_page_refresh_secs(),
        }
    }
}
