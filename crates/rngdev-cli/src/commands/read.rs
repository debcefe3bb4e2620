use std::io::Read;

/// Open the node read-only, issue a single read and print what came back.
/// Exits with the OS error code if the node cannot be opened.
pub fn run(path: &str, n_bytes: usize) {
    println!("Starting device test code example...");

    let mut device = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to open the device...: {e}");
            std::process::exit(e.raw_os_error().unwrap_or(1));
        }
    };

    let mut buf = vec![0u8; n_bytes];
    match device.read(&mut buf) {
        Ok(n) => println!("{}", describe(&buf[..n], n_bytes)),
        Err(e) => {
            eprintln!("Failed to read from the device: {e}");
            std::process::exit(e.raw_os_error().unwrap_or(1));
        }
    }

    println!("End of the program");
}

fn describe(data: &[u8], requested: usize) -> String {
    match <[u8; 4]>::try_from(data) {
        Ok(word) => format!("Random number generated: {}", i32::from_ne_bytes(word)),
        Err(_) if data.is_empty() && requested > 0 => "Device returned end of stream".to_string(),
        Err(_) => format!("Random bytes ({}): {}", data.len(), super::hex(data)),
    }
}
