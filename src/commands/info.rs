//! Info command implementation

use qspiflash_core::Attribute;

use super::format_size;
use crate::backends::Flash;

/// Print what was found while attaching
pub fn run_info(flash: &Flash) {
    println!("Vendor:     {}", flash.vendor());
    println!("Capacity:   {}", format_size(flash.capacity()));
    println!("FIFO depth: {} bytes", flash.fifo_depth());

    for attr in Attribute::ALL {
        print!("{:11} {}", format!("{}:", attr.name()), flash.attribute(attr));
    }
}
