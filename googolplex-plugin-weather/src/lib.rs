use std::time::Duration;

use googolplex_plugin::{Metadata, Responder, ResponderResult, Score, escape_markup};
use reqwest::blocking::Client;
use serde::Deserialize;

const TRIGGER_WORDS: &[&str] = &[
    "weather", "temperature", "rain", "snow", "windy", "cloudy", "sunny", "forecast", "temp",
];
const USER_AGENT: &str = "googolplex-weather/0.1";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);
const FORECAST_TIMEOUT: Duration = Duration::from_secs(10);

const REVERSE_URL: &str = "https://nominatim.openstreetmap.org/reverse";
const IP_URL: &str = "http://ip-api.com/json/";
const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

const FALLBACK_LAT: f64 = 40.7128;
const FALLBACK_LON: f64 = -74.0060;
const FALLBACK_NAME: &str = "New York, USA";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Gps,
    IpBased,
    Fallback,
}

impl Source {
    fn label(self) -> &'static str {
        match self {
            Source::Gps => "GPS",
            Source::IpBased => "IP-based",
            Source::Fallback => "Fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Location {
    lat: f64,
    lon: f64,
    name: String,
    source: Source,
}

impl Location {
    fn fallback() -> Self {
        Self {
            lat: FALLBACK_LAT,
            lon: FALLBACK_LON,
            name: FALLBACK_NAME.to_string(),
            source: Source::Fallback,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Conditions {
    temperature: i64,
    wind_speed: f64,
    code: u16,
    sunrise: String,
    sunset: String,
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Address,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpResponse {
    status: String,
    lat: Option<f64>,
    lon: Option<f64>,
    city: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current_weather: CurrentWeather,
    #[serde(default)]
    daily: Option<Daily>,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature: f64,
    windspeed: f64,
    weathercode: u16,
}

#[derive(Debug, Default, Deserialize)]
struct Daily {
    #[serde(default)]
    sunrise: Vec<String>,
    #[serde(default)]
    sunset: Vec<String>,
}

/// Where the responder looks things up.
#[derive(Debug, Clone)]
struct Endpoints {
    reverse: String,
    ip: String,
    forecast: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            reverse: REVERSE_URL.to_string(),
            ip: IP_URL.to_string(),
            forecast: FORECAST_URL.to_string(),
        }
    }
}

/// Current conditions for a `gps:lat,lon` position, or for wherever the
/// machine's public address puts it.
struct WeatherResponder {
    endpoints: Endpoints,
}

fn claims(query: &str) -> bool {
    let query = query.trim().to_lowercase();
    TRIGGER_WORDS.iter().any(|word| query.contains(word))
}

/// Parses `gps:47.2692,11.4041` anywhere in the query.
fn coords_from_query(query: &str) -> Option<(f64, f64)> {
    let lower = query.to_lowercase();
    let (_, rest) = lower.split_once("gps:")?;
    let token = rest.split_whitespace().next()?;
    let (lat, lon) = token.split_once(',')?;
    let (lat, lon) = (lat.trim().parse::<f64>().ok()?, lon.trim().parse::<f64>().ok()?);
    ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)).then_some((lat, lon))
}

fn coordinates_name(lat: f64, lon: f64) -> String {
    format!("Coordinates {lat:.2}, {lon:.2}")
}

/// `HH:MM` out of an ISO timestamp such as `2024-05-01T05:47`.
fn clock_time(timestamp: Option<&String>) -> Option<String> {
    let (_, time) = timestamp?.split_once('T')?;
    time.get(..5).map(str::to_string)
}

fn describe_code(code: u16) -> (&'static str, &'static str) {
    match code {
        0 => ("☀️", "Clear sky"),
        1 => ("🌤️", "Mainly clear"),
        2 => ("⛅", "Partly cloudy"),
        3 => ("☁️", "Overcast"),
        45 => ("🌫️", "Foggy"),
        48 => ("🌫️", "Dense fog"),
        51 => ("🌦️", "Light drizzle"),
        53 => ("🌧️", "Drizzle"),
        55 => ("🌧️", "Heavy drizzle"),
        61 => ("🌧️", "Light rain"),
        63 => ("🌧️", "Rain"),
        65 => ("🌧️", "Heavy rain"),
        71 => ("❄️", "Light snow"),
        73 => ("❄️", "Snow"),
        75 => ("❄️", "Heavy snow"),
        80 => ("🌦️", "Rain showers"),
        81 => ("🌧️", "Heavy rain showers"),
        85 => ("🌨️", "Snow showers"),
        95 => ("⛈️", "Thunderstorm"),
        _ => ("🌤️", "Unknown"),
    }
}

impl WeatherResponder {
    fn client(timeout: Duration) -> Result<Client, String> {
        Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| err.to_string())
    }

    fn locate(&self, query: &str) -> Location {
        if let Some((lat, lon)) = coords_from_query(query) {
            return Location {
                lat,
                lon,
                name: self.place_name(lat, lon),
                source: Source::Gps,
            };
        }
        self.ip_location().unwrap_or_else(|_| Location::fallback())
    }

    /// Reverse geocodes a position, falling back to the bare coordinates.
    fn place_name(&self, lat: f64, lon: f64) -> String {
        let lookup = || -> Result<Address, String> {
            let response = Self::client(LOOKUP_TIMEOUT)?
                .get(&self.endpoints.reverse)
                .query(&[("lat", lat.to_string()), ("lon", lon.to_string()), ("format", "json".to_string())])
                .send()
                .and_then(|response| response.error_for_status())
                .map_err(|err| err.to_string())?;
            let reverse = response.json::<ReverseResponse>().map_err(|err| err.to_string())?;
            Ok(reverse.address)
        };

        let Ok(address) = lookup() else {
            return coordinates_name(lat, lon);
        };
        let city = address
            .city
            .or(address.town)
            .or(address.village)
            .filter(|city| !city.is_empty());
        match (city, address.country.filter(|country| !country.is_empty())) {
            (Some(city), Some(country)) => format!("{city}, {country}"),
            (Some(city), None) => city,
            (None, _) => coordinates_name(lat, lon),
        }
    }

    fn ip_location(&self) -> Result<Location, String> {
        let response = Self::client(LOOKUP_TIMEOUT)?
            .get(&self.endpoints.ip)
            .send()
            .map_err(|err| err.to_string())?;
        let located = response.json::<IpResponse>().map_err(|err| err.to_string())?;
        if located.status != "success" {
            return Err(format!("lookup status {}", located.status));
        }
        let (Some(lat), Some(lon)) = (located.lat, located.lon) else {
            return Err("lookup returned no position".to_string());
        };

        let city = located.city.unwrap_or_else(|| "Unknown City".to_string());
        let name = match located.country.filter(|country| !country.is_empty()) {
            Some(country) => format!("{city}, {country}"),
            None => city,
        };
        Ok(Location {
            lat,
            lon,
            name,
            source: Source::IpBased,
        })
    }

    fn forecast(&self, location: &Location) -> Result<Conditions, String> {
        let response = Self::client(FORECAST_TIMEOUT)?
            .get(&self.endpoints.forecast)
            .query(&[
                ("latitude", location.lat.to_string()),
                ("longitude", location.lon.to_string()),
                ("current_weather", "true".to_string()),
                ("daily", "sunrise,sunset".to_string()),
                ("forecast_days", "1".to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|err| err.to_string())?;
        let forecast = response.json::<ForecastResponse>().map_err(|err| err.to_string())?;

        let daily = forecast.daily.unwrap_or_default();
        Ok(Conditions {
            temperature: forecast.current_weather.temperature as i64,
            wind_speed: forecast.current_weather.windspeed,
            code: forecast.current_weather.weathercode,
            sunrise: clock_time(daily.sunrise.first()).unwrap_or_else(|| "06:30".to_string()),
            sunset: clock_time(daily.sunset.first()).unwrap_or_else(|| "19:30".to_string()),
        })
    }
}

fn weather_result(location: &Location, conditions: &Conditions) -> ResponderResult {
    let (emoji, condition) = describe_code(conditions.code);
    let place = escape_markup(&location.name);
    let short: String = location.name.chars().take(20).collect();
    let body = format!(
        "<div class=\"weather-now\">\
         <div class=\"weather-icon\">{emoji}</div>\
         <div class=\"weather-temp\">{temp}°C</div>\
         <div class=\"weather-condition\">{condition}</div>\
         <div class=\"weather-place\">📍 {place}</div>\
         <div class=\"weather-source\">Source: {source}</div>\
         </div>\
         <div class=\"weather-details\">\
         <div>💨 Wind <strong>{wind:.0} km/h</strong></div>\
         <div>🌅 Sun <strong>{sunrise} - {sunset}</strong></div>\
         </div>\
         <p class=\"weather-coords\">Coordinates: {lat:.4}, {lon:.4}</p>",
        temp = conditions.temperature,
        source = location.source.label(),
        wind = conditions.wind_speed,
        sunrise = escape_markup(&conditions.sunrise),
        sunset = escape_markup(&conditions.sunset),
        lat = location.lat,
        lon = location.lon,
    );

    ResponderResult::new(format!("Weather for {}", location.name), body)
        .with_badge(format!("📍 {short}"))
        .with_badge(format!("{}°C", conditions.temperature))
        .with_badge(condition)
        .with_badge(location.source.label())
        .with_item("🌡️ Temperature", format!("{}°C - {condition}", conditions.temperature))
        .with_item("💨 Wind", format!("{:.0} km/h", conditions.wind_speed))
        .with_item(
            "🌅 Sun Times",
            format!("Rise: {}, Set: {}", conditions.sunrise, conditions.sunset),
        )
        .with_item(
            "📍 Location",
            format!("{} ({})", location.name, location.source.label()),
        )
}

fn error_result(err: &str) -> ResponderResult {
    let detail: String = err.chars().take(100).collect();
    ResponderResult::new(
        "Weather Error",
        format!(
            "<div class=\"error-message\"><h4>Weather Error</h4>\
             <p>Could not load weather data</p><p>Error: {}</p></div>",
            escape_markup(&detail)
        ),
    )
    .with_badge("❌ Error")
    .with_item("Status", "Failed to load weather data")
}

impl Responder for WeatherResponder {
    fn describe(&self) -> Metadata {
        Metadata::new("Weather", "Plugin: Weather", "rgba(6, 182, 212, 0.8)")
    }

    fn score(&self, query: &str) -> Score {
        Score::Claim(claims(query))
    }

    fn render(&self, query: &str) -> ResponderResult {
        let location = self.locate(query);
        match self.forecast(&location) {
            Ok(conditions) => weather_result(&location, &conditions),
            Err(err) => error_result(&err),
        }
    }
}

#[allow(improper_ctypes_definitions)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _googolplex_init() -> *mut dyn Responder {
    Box::into_raw(Box::new(WeatherResponder {
        endpoints: Endpoints::default(),
    }))
}
