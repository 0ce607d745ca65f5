use std::env;
use std::fs;
use std::path::PathBuf;

const LIB_NAME: &str = "fvp";

fn main() {
	let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
	let target_dir = target_dir();

	// Generate C header into target/include/
	let include_dir = target_dir.join("include");
	fs::create_dir_all(&include_dir).expect("Failed to create include directory");
	let header = include_dir.join(format!("{}.h", LIB_NAME));
	cbindgen::Builder::new()
		.with_crate(&crate_dir)
		.with_language(cbindgen::Language::C)
		.with_include_guard("FVP_H")
		.with_cpp_compat(true)
		.generate()
		.expect("Unable to generate bindings")
		.write_to_file(&header);
}

fn target_dir() -> PathBuf {
	// OUT_DIR is target/{debug|release}/build/{crate}-{hash}/out
	PathBuf::from(env::var("OUT_DIR").unwrap())
		.parent()
		.and_then(|p| p.parent())
		.and_then(|p| p.parent())
		.and_then(|p| p.parent())
		.expect("Failed to get target directory from OUT_DIR")
		.to_path_buf()
}
