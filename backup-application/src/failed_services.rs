//! 故障依赖登记表
//!
//! 订阅者遇到连通性故障时登记对应依赖的熔断器，并把事件放入其重试队列；
//! 依赖恢复连通后由 `prune_recovered` 移除。
use backup_domain::domain_event::DomainEvent;
use backup_domain::eventing::{CircuitBreaker, RetryDisposition};
use dashmap::DashMap;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct FailedServiceRegistry {
    services: DashMap<String, CircuitBreaker>,
}

impl FailedServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记故障依赖，已登记时返回 false
    pub fn register(&self, breaker: &CircuitBreaker) -> bool {
        if self.services.contains_key(breaker.name()) {
            return false;
        }
        warn!(service = breaker.name(), state = ?breaker.state(), "service marked as failing");
        self.services
            .insert(breaker.name().to_string(), breaker.clone())
            .is_none()
    }

    /// 把事件交给已登记依赖的重试队列；依赖未登记时返回 None
    pub fn enqueue_retry(&self, service: &str, event: DomainEvent) -> Option<RetryDisposition> {
        let breaker = self.services.get(service).map(|entry| entry.value().clone())?;
        Some(breaker.add_retry_event(event))
    }

    /// 移除已恢复连通的依赖，返回被移除的名称
    pub fn prune_recovered(&self) -> Vec<String> {
        let mut recovered = Vec::new();
        self.services.retain(|name, breaker| {
            let keep = !breaker.is_connected();
            if !keep {
                recovered.push(name.clone());
            }
            keep
        });
        for name in &recovered {
            info!(service = %name, "service recovered");
        }
        recovered
    }

    pub fn is_failing(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    /// 当前登记的依赖名称（按名称排序）
    pub fn failing(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
