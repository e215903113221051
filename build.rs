fn main() -> Result<(), Box<dyn std::error::Error>> {
  // protox compiles the proto in-process so builds do not depend on a
  // system protoc binary.
  let file_descriptors = protox::compile(["src/api/v1/log.proto"], ["src"])?;

  tonic_build::configure().compile_fds(file_descriptors)?;

  println!("cargo:rerun-if-changed=src/api/v1/log.proto");

  Ok(())
}
