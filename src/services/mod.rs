pub mod conversation_service;
pub mod health_service;
pub mod notification;
pub mod subscription;
pub mod upload_service;
