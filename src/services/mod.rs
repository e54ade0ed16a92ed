pub mod cloud_providers;
pub mod local_sink;
pub mod progress_channel;
pub mod relay_service;
pub mod resumable;
pub mod storage;
pub mod storage_lifecycle;
pub mod transfer_identity;
pub mod type_resolver;
pub mod upload_dispatcher;
pub mod worker;
