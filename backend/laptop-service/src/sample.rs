//! Random laptop generator for the demo client and tests

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

use crate::grpc::pb::{
    keyboard, laptop, memory, screen, storage, Cpu, Gpu, Keyboard, Laptop, Memory, Screen, Storage,
};

fn pick<'a>(options: &[&'a str]) -> &'a str {
    options.choose(&mut rand::thread_rng()).copied().unwrap_or_default()
}

fn between(min: f64, max: f64) -> f64 {
    if min >= max {
        return min;
    }
    rand::thread_rng().gen_range(min..max)
}

fn gigabytes(value: u64) -> Memory {
    Memory {
        value,
        unit: memory::Unit::Gigabyte as i32,
    }
}

pub fn new_keyboard() -> Keyboard {
    let layout = *[keyboard::Layout::Qwerty, keyboard::Layout::Qwertz, keyboard::Layout::Azerty]
        .choose(&mut rand::thread_rng())
        .unwrap_or(&keyboard::Layout::Qwerty);

    Keyboard {
        layout: layout as i32,
        backlit: rand::random(),
    }
}

pub fn new_cpu() -> Cpu {
    let mut rng = rand::thread_rng();
    let brand = pick(&["Intel", "AMD"]);
    let name = match brand {
        "Intel" => pick(&["Xeon E-2286M", "Core i9-9980HK", "Core i7-9750H", "Core i5-9400F"]),
        _ => pick(&["Ryzen 7 PRO 2700U", "Ryzen 5 PRO 3500U", "Ryzen 3 PRO 3200GE"]),
    };

    let cores = rng.gen_range(2..=8);
    let min_ghz = between(2.0, 3.5);

    Cpu {
        brand: brand.to_string(),
        name: name.to_string(),
        number_cores: cores,
        number_threads: rng.gen_range(cores..=12),
        min_ghz,
        max_ghz: between(min_ghz, 5.0),
    }
}

pub fn new_gpu() -> Gpu {
    let brand = pick(&["NVIDIA", "AMD"]);
    let name = match brand {
        "NVIDIA" => pick(&["RTX 2060", "RTX 2070", "GTX 1660-Ti", "GTX 1070"]),
        _ => pick(&["RX 590", "RX 580", "RX 5700-XT", "RX Vega-56"]),
    };
    let min_ghz = between(1.0, 1.5);

    Gpu {
        brand: brand.to_string(),
        name: name.to_string(),
        min_ghz,
        max_ghz: between(min_ghz, 2.0),
        memory: Some(gigabytes(rand::thread_rng().gen_range(2..=6))),
    }
}

pub fn new_ram() -> Memory {
    gigabytes(rand::thread_rng().gen_range(4..=64))
}

pub fn new_ssd() -> Storage {
    Storage {
        driver: storage::Driver::Ssd as i32,
        memory: Some(gigabytes(rand::thread_rng().gen_range(128..=1024))),
    }
}

pub fn new_hdd() -> Storage {
    Storage {
        driver: storage::Driver::Hdd as i32,
        memory: Some(Memory {
            value: rand::thread_rng().gen_range(1..=6),
            unit: memory::Unit::Terabyte as i32,
        }),
    }
}

pub fn new_screen() -> Screen {
    let mut rng = rand::thread_rng();
    let height = rng.gen_range(1080..=4320);
    let panel = if rng.gen_bool(0.5) {
        screen::Panel::Ips
    } else {
        screen::Panel::Oled
    };

    Screen {
        size_inch: rng.gen_range(13.0..17.0),
        resolution: Some(screen::Resolution {
            width: height * 16 / 9,
            height,
        }),
        panel: panel as i32,
        multitouch: rng.gen(),
    }
}

pub fn new_laptop() -> Laptop {
    let brand = pick(&["Apple", "Dell", "Lenovo"]);
    let name = match brand {
        "Apple" => pick(&["Macbook Air", "Macbook Pro"]),
        "Dell" => pick(&["Latitude", "Vostro", "XPS", "Alienware"]),
        _ => pick(&["Thinkpad X1", "Thinkpad P1", "Thinkpad P53"]),
    };
    let now = Utc::now();

    Laptop {
        id: Uuid::new_v4().to_string(),
        brand: brand.to_string(),
        name: name.to_string(),
        cpu: Some(new_cpu()),
        ram: Some(new_ram()),
        gpus: vec![new_gpu()],
        storages: vec![new_ssd(), new_hdd()],
        screen: Some(new_screen()),
        keyboard: Some(new_keyboard()),
        weight: Some(laptop::Weight::WeightKg(between(1.0, 3.0))),
        price_usd: between(1500.0, 3500.0),
        release_year: rand::thread_rng().gen_range(2015..=2019),
        updated_at: Some(prost_types::Timestamp {
            seconds: now.timestamp(),
            nanos: now.timestamp_subsec_nanos() as i32,
        }),
    }
}

/// A score between 1 and 10
pub fn random_laptop_score() -> f64 {
    f64::from(rand::thread_rng().gen_range(1..=10))
}
