use serde::{Deserialize, Serialize};
use std::fmt;

/// 事件种类（封闭集合），订阅与分发均以此为键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// 备份请求已受理，等待资格校验
    RequestReceived,
    /// 资格校验通过，等待发送至下游接口
    RequestChecked,
    /// 已发送至下游接口，等待回复
    RequestSent,
    /// 已收到下游回复
    ReplyReceived,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::RequestReceived,
        EventKind::RequestChecked,
        EventKind::RequestSent,
        EventKind::ReplyReceived,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            EventKind::RequestReceived => "backup_request.received",
            EventKind::RequestChecked => "backup_request.checked",
            EventKind::RequestSent => "backup_request.sent",
            EventKind::ReplyReceived => "backup_request.replied",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
