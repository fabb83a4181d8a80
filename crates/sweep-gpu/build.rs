fn main() {
    println!("cargo:rerun-if-changed=kernels/sweep_kernel.cu");
    println!("cargo:rerun-if-env-changed=SWEEP_CUDA_ARCH");

    // Host-only builds never touch nvcc.
    if std::env::var_os("CARGO_FEATURE_CUDA").is_none() {
        return;
    }

    let out_dir = std::env::var("OUT_DIR").unwrap();
    let arch = std::env::var("SWEEP_CUDA_ARCH").unwrap_or_else(|_| "sm_86".to_string());

    // Compile sweep_kernel.cu → PTX
    let ptx = format!("{}/sweep_kernel.ptx", out_dir);
    let status = std::process::Command::new("nvcc")
        .args([
            "--ptx",
            &format!("-arch={arch}"),
            "-O3",
            "-o",
            &ptx,
            "kernels/sweep_kernel.cu",
        ])
        .status()
        .expect("Failed to run nvcc. Is CUDA toolkit installed?");
    if !status.success() {
        panic!("nvcc failed to compile sweep_kernel.cu");
    }
}
