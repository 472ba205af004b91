mod proxy;
mod status;

pub use proxy::{ProxyState, proxy_router};
