pub mod account;
pub mod bootstrap_token;
pub mod pool;
pub mod recommendation;
pub mod resource;
pub mod sync_job;

pub use account::Account;
pub use bootstrap_token::BootstrapToken;
pub use pool::Pool;
pub use recommendation::Recommendation;
pub use resource::DiscoveredResource;
pub use sync_job::SyncJob;
