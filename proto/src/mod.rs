//! Protobuf and gRPC bindings for P4Runtime, generated by `build.rs`.

pub mod p4info;
pub mod p4runtime;
pub mod p4runtime_grpc;
pub mod status;
