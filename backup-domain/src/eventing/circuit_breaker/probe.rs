use crate::error::ConnectivityError;
use async_trait::async_trait;
use std::future::Future;

/// 依赖探活：成功返回 `Ok(())`，不可达返回 `ConnectivityError`
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> Result<(), ConnectivityError>;
}

/// 以闭包实现的探活
pub struct FnProbe<F>(F);

pub fn probe_fn<F, Fut>(f: F) -> FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ConnectivityError>> + Send,
{
    FnProbe(f)
}

#[async_trait]
impl<F, Fut> HealthProbe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ConnectivityError>> + Send,
{
    async fn check(&self) -> Result<(), ConnectivityError> {
        (self.0)().await
    }
}
