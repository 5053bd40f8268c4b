pub mod config;
pub mod error;
pub mod session;
pub mod shutdown;
pub mod task;
pub mod template;
pub mod tls;
pub mod worker;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("dispatch");
}
