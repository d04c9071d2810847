//! Chromium adapter for the `satbot-core` page contract, speaking CDP through
//! `chromiumoxide`.

mod page;
mod provisioner;

pub use page::ChromiumPage;
pub use provisioner::ChromiumProvisioner;
