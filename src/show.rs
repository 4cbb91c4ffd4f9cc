use log::{error, warn};

use atom_vbios::{
    AtomBios,
    image::Image,
    reg_block::RegBlock,
    vram::{MemoryType, MemoryVendor, VramInfo, VramModule},
};

/// Classic hex dump: offset, 16 bytes, ASCII
fn hexdump(data: &[u8]) {
    for (i, line) in data.chunks(16).enumerate() {
        let hex = line
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<String>>()
            .join(" ");
        let ascii = line
            .iter()
            .map(|b| match b {
                0x20..=0x7e => *b as char,
                _ => '.',
            })
            .collect::<String>();
        println!("{:08x}: {hex:47}  {ascii}", i * 16);
    }
}

/// Returns false if any of the tables could not be decoded.
pub fn show_tables(bios: &AtomBios, image: Image, hexdump_tables: bool) -> bool {
    let mut ok = true;
    for t in bios.tables(image) {
        match t {
            Ok(t) => {
                let h = t.header;
                println!("Name: {}", t.name);
                println!("Offset: 0x{:02x}", t.offset);
                println!("Length: {}", t.len());
                println!("Version: {}.{}", h.format_revision, h.content_revision);
                if hexdump_tables {
                    println!();
                    hexdump(&t.payload);
                }
                println!();
            }
            Err(e) => {
                error!("{e}");
                ok = false;
            }
        }
    }
    ok
}

fn print_module(id: usize, m: &VramModule) {
    println!("ID: {id}");
    if !m.part_number.is_empty() {
        println!("Name: {}", m.part_number);
    }
    match m.memory_type() {
        MemoryType::Unknown(t) => println!("Type: unknown (0x{t:02x})"),
        t => println!("Type: {t}"),
    }
    println!("Total size: {}MB", m.info.memory_size);
    match m.vendor() {
        MemoryVendor::Unknown(v) => println!("Vendor: unknown (0x{v:x})"),
        v => println!("Vendor: {v}"),
    }
    println!("Revision: {}", m.revision());
    if let Some(d) = m.density() {
        println!("Density: {d}");
    }
    let c = m.info.channel_num;
    let w = m.channel_width_bits();
    println!("Channels: {c} x {w}bit");
    if let Some(r) = m.refresh_rate_ms() {
        println!("Refresh rate factor: {r}ms");
    }
}

pub fn show_vram(vram: &VramInfo, clk_patch: Option<&RegBlock>, print_offsets: bool) {
    println!("VRAM info @ {:08x}, {}", vram.offset, vram.header);
    println!();
    let modules = match vram.modules() {
        Ok(m) => m,
        Err(e) => {
            error!("{e}");
            return;
        }
    };
    match clk_patch {
        Some(rb) => {
            let o = rb.offset;
            let n = rb.blocks.len();
            let regs = rb
                .index
                .iter()
                .map(|i| format!("{i}"))
                .collect::<Vec<String>>()
                .join(", ");
            println!("Memory clock patch table @ {o:08x}, {n} data blocks");
            println!("Registers: {regs}");
            println!();
        }
        None => warn!("No memory clock patch table"),
    }
    for (id, m) in modules.iter().enumerate() {
        print_module(id, m);
        println!();
        let Some(rb) = clk_patch else {
            continue;
        };
        for b in rb.blocks_for(id as u8) {
            let regs = b
                .data
                .iter()
                .map(|v| format!("{v:08x}"))
                .collect::<Vec<String>>()
                .join(" ");
            if print_offsets {
                println!("{}\t{:08x}: {regs}", b.clock_mhz(), b.offset);
            } else {
                println!("{}\t{regs}", b.clock_mhz());
            }
        }
        println!();
    }
}
