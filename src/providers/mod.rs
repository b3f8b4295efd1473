//! 外部协作方客户端：旅行搜索（Amadeus 风格）、行程服务、用户画像

mod amadeus;
mod itinerary;
mod profile;

pub use amadeus::{
    ActivityOffer, ActivityQuery, AmadeusAuth, AmadeusClient, FlightOffer, FlightQuery,
    HotelOffer, HotelQuery, ProviderError, TravelSearchProvider,
};
pub use itinerary::{
    HttpItineraryProvider, Itinerary, ItineraryItem, ItineraryProvider, ItineraryUpdate,
};
pub use profile::{HttpProfileClient, NoopProfileClient, UserProfileClient};
