pub mod intents;
pub mod refunds;
pub mod settlement;
pub mod webhooks;

pub use intents::IntentService;
pub use refunds::RefundService;
pub use settlement::SettlementService;
pub use webhooks::WebhookService;
