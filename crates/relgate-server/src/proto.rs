pub mod relgate {
    pub mod v1 {
        tonic::include_proto!("relgate.v1");
    }
}
