mod errors;
mod octocrab_client;

pub use errors::map_err;
pub use octocrab_client::OctocrabClient;
