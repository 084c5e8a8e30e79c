//! List command implementation

use crate::backends::available_backends;

/// Print the backends compiled into this binary
pub fn list_backends() {
    let backends = available_backends();
    if backends.is_empty() {
        println!("No backends available (recompile with backend features enabled)");
        return;
    }

    println!("Available backends:");
    for b in &backends {
        println!("  {:10} - {}", b.name, b.description);
    }
}
