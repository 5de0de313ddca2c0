pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod history;
pub mod service;
pub mod store;
pub mod subscription;
pub mod topics;
pub mod types;

pub use dispatcher::{
    DirectDelivery, MulticastDelivery, NotificationDispatcher, TargetOutcome, TopicDelivery,
};
pub use error::NotificationError;
pub use gateway::{
    AccessTokenSource, DeliveryOutcome, DryRunGateway, FcmConfig, FcmGateway, MessageTarget,
    PushGateway, PushMessage, ServiceAccountKey, ServiceAccountTokenSource, StaticTokenSource,
};
pub use history::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT, NotificationHistory};
pub use service::{NotificationContext, NotificationService};
pub use store::{AuditLog, SubscriptionStore, TokenStore};
pub use subscription::TopicSubscriptionManager;
pub use topics::{BloodRequest, CATEGORY_TOPIC_PREFIX, category_topic};
pub use types::*;
