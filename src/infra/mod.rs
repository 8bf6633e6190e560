//! 基础设施层
//!
//! 外部命令执行、进程管理器和 frps dashboard 客户端

pub mod command;
pub mod frps_dashboard;
pub mod supervisor;

pub use command::{CommandError, CommandRunner};
pub use frps_dashboard::{DashboardError, FrpsDashboard, ProxyStatsSource, ProxyTotals};
pub use supervisor::{Supervisor, SupervisorOutput, SystemdSupervisor};
