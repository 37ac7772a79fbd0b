pub mod hostd {
    tonic::include_proto!("hostd");
}
