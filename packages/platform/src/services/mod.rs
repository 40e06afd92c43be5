pub mod accounts;
pub mod automation;
pub mod datalink;
pub mod oracle;

pub use accounts::AccountsService;
pub use automation::AutomationService;
pub use datalink::DatalinkService;
pub use oracle::OracleService;
