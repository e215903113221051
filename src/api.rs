pub mod v1 {
  tonic::include_proto!("api.v1");
}
