/// Demo client for the laptop service
///
/// Logs in, keeps its token fresh in the background, then exercises every
/// LaptopService RPC: create, search, image upload (when `UPLOAD_IMAGE_PATH` is
/// set) and rating.
use std::path::Path;

use anyhow::{bail, Context, Result};
use laptop_service::{
    config::ClientSettings,
    grpc::{
        pb::{memory, CreateLaptopRequest, Filter, Memory, RateLaptopRequest, SearchLaptopRequest, UploadImageRequest},
        AuthClient, LaptopServiceClient, AUTHENTICATED_METHODS,
    },
    sample,
};
use grpc_jwt_propagation::{JwtClientInterceptor, TokenRefresher};
use tonic::codegen::InterceptedService;
use tonic::transport::{Channel, Endpoint};
use tracing::{info, warn};

type Client = LaptopServiceClient<InterceptedService<Channel, JwtClientInterceptor>>;

const CHUNK_SIZE: usize = 1024;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "laptop_client=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    let settings = ClientSettings::load().context("Failed to load client configuration")?;
    info!(server_url = %settings.server_url, "Connecting to laptop service");

    let channel = Endpoint::from_shared(settings.server_url.clone())
        .context("Invalid LAPTOP_SERVICE_URL")?
        .connect()
        .await
        .context("Failed to connect to laptop service")?;

    let login = AuthClient::new(channel.clone(), &settings.username, &settings.password);
    let refresher = TokenRefresher::start(login, settings.refresh_interval)
        .await
        .context("Login failed")?;

    let mut client = LaptopServiceClient::with_interceptor(channel, refresher.interceptor(AUTHENTICATED_METHODS));

    let mut laptop_ids = Vec::new();
    for _ in 0..3 {
        laptop_ids.push(create_laptop(&mut client).await?);
    }

    search_laptop(&mut client).await?;

    if let Some(path) = &settings.upload_image_path {
        upload_image(&mut client, &laptop_ids[0], path).await?;
    }

    rate_laptops(&mut client, &laptop_ids).await?;

    refresher.shutdown();
    info!("Done");

    Ok(())
}

async fn create_laptop(client: &mut Client) -> Result<String> {
    let mut laptop = sample::new_laptop();
    laptop.id = String::new();

    let response = client
        .create_laptop(CreateLaptopRequest {
            laptop: Some(laptop),
        })
        .await
        .context("CreateLaptop failed")?;

    let id = response.into_inner().id;
    info!(laptop_id = %id, "Created laptop");
    Ok(id)
}

async fn search_laptop(client: &mut Client) -> Result<()> {
    let filter = Filter {
        max_price_usd: 3000.0,
        min_cpu_cores: 4,
        min_cpu_ghz: 2.5,
        min_ram: Some(Memory {
            value: 8,
            unit: memory::Unit::Gigabyte as i32,
        }),
    };
    info!(?filter, "Searching laptops");

    let mut stream = client
        .search_laptop(SearchLaptopRequest {
            filter: Some(filter),
        })
        .await
        .context("SearchLaptop failed")?
        .into_inner();

    while let Some(response) = stream.message().await.context("SearchLaptop stream failed")? {
        if let Some(laptop) = response.laptop {
            info!(
                laptop_id = %laptop.id,
                brand = %laptop.brand,
                name = %laptop.name,
                price_usd = laptop.price_usd,
                "Found laptop"
            );
        }
    }

    Ok(())
}

async fn upload_image(client: &mut Client, laptop_id: &str, path: &Path) -> Result<()> {
    let image = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))?;

    let image_type = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let mut requests = vec![UploadImageRequest::info(laptop_id, image_type)];
    requests.extend(image.chunks(CHUNK_SIZE).map(UploadImageRequest::chunk));

    let response = client
        .upload_image(tokio_stream::iter(requests))
        .await
        .context("UploadImage failed")?
        .into_inner();

    info!(image_id = %response.id, size = response.size, "Image uploaded");
    Ok(())
}

async fn rate_laptops(client: &mut Client, laptop_ids: &[String]) -> Result<()> {
    let requests: Vec<_> = laptop_ids
        .iter()
        .map(|laptop_id| RateLaptopRequest {
            laptop_id: laptop_id.clone(),
            score: sample::random_laptop_score(),
        })
        .collect();

    let mut stream = client
        .rate_laptop(tokio_stream::iter(requests.clone()))
        .await
        .context("RateLaptop failed")?
        .into_inner();

    let mut received = 0;
    while let Some(response) = stream.message().await.context("RateLaptop stream failed")? {
        info!(
            laptop_id = %response.laptop_id,
            rated_count = response.rated_count,
            average_score = response.average_score,
            "Laptop rated"
        );
        received += 1;
    }

    if received != requests.len() {
        warn!(sent = requests.len(), received, "Rating responses missing");
        bail!("expected {} rating responses, got {}", requests.len(), received);
    }

    Ok(())
}
