//! Translation from the file/CLI configuration to client settings.

use ysradar_config::Config;
use ysradar_net::{ClientConfig, FrameConfig, NavFilter};

/// Build the client settings described by `config`.
pub fn client_config(config: &Config) -> ClientConfig {
    let radar = &config.radar;
    let aliases = radar
        .ground_features
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    ClientConfig {
        keepalive_interval: radar.keepalive_interval(),
        user_timeout: radar.user_timeout(),
        frame: FrameConfig {
            max_payload_size: radar.max_frame_payload,
        },
        nav_filter: NavFilter::new(&radar.nav_types, &aliases),
        history_limit: radar.notification_history,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use ysradar_net::NavType;

    #[test]
    fn test_defaults_carry_over() {
        let client = client_config(&Config::default());
        assert_eq!(client.keepalive_interval, Duration::from_secs(5));
        assert_eq!(client.user_timeout, Duration::from_secs(15));
        assert_eq!(client.frame.max_payload_size, 1024 * 1024);
        assert_eq!(client.history_limit, 100);
        assert_eq!(client.nav_filter.resolve("ILS2[CJAP]"), Some(NavType::Ils));
        assert_eq!(client.nav_filter.resolve("VORDME"), Some(NavType::VorDme));
    }

    #[test]
    fn test_restricted_nav_types() {
        let mut config = Config::default();
        config.radar.nav_types = vec!["NDB".to_string()];
        let client = client_config(&config);
        assert_eq!(client.nav_filter.resolve("ILS"), None);
        assert_eq!(client.nav_filter.resolve("LDA[CJAP]"), Some(NavType::Ndb));
    }
}
