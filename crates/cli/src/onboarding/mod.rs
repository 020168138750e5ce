#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingScreen {
    Welcome,
    ConnectAccounts,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    GoogleAds,
    Meta,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::GoogleAds, Platform::Meta];

    pub fn label(&self) -> &'static str {
        match self {
            Platform::GoogleAds => "Google Ads",
            Platform::Meta => "Meta Ads",
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Platform::GoogleAds)
    }

    pub fn is_required(&self) -> bool {
        matches!(self, Platform::GoogleAds)
    }
}

pub struct OnboardingState {
    pub current_screen: OnboardingScreen,
    pub google_ads_connected: bool,
    pub error_message: Option<String>,
}

impl Default for OnboardingState {
    fn default() -> Self {
        Self::new()
    }
}

impl OnboardingState {
    pub fn new() -> Self {
        Self {
            current_screen: OnboardingScreen::Welcome,
            google_ads_connected: false,
            error_message: None,
        }
    }

    pub fn is_connected(&self, platform: Platform) -> bool {
        match platform {
            Platform::GoogleAds => self.google_ads_connected,
            Platform::Meta => false,
        }
    }

    pub fn can_proceed(&self) -> bool {
        match self.current_screen {
            OnboardingScreen::Welcome => true,
            OnboardingScreen::ConnectAccounts => Platform::ALL
                .iter()
                .filter(|p| p.is_required())
                .all(|p| self.is_connected(*p)),
            OnboardingScreen::Complete => false,
        }
    }

    /// Advances when the current screen allows it; otherwise records why not.
    pub fn next_screen(&mut self) -> bool {
        if !self.can_proceed() {
            if self.current_screen == OnboardingScreen::ConnectAccounts {
                self.error_message = Some("Connect Google Ads to continue.".to_string());
            }
            return false;
        }
        self.error_message = None;
        self.current_screen = match self.current_screen {
            OnboardingScreen::Welcome => OnboardingScreen::ConnectAccounts,
            OnboardingScreen::ConnectAccounts => OnboardingScreen::Complete,
            OnboardingScreen::Complete => OnboardingScreen::Complete,
        };
        true
    }

    pub fn previous_screen(&mut self) {
        self.current_screen = match self.current_screen {
            OnboardingScreen::Welcome => OnboardingScreen::Welcome,
            OnboardingScreen::ConnectAccounts => OnboardingScreen::Welcome,
            OnboardingScreen::Complete => OnboardingScreen::ConnectAccounts,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_step_requires_google_ads() {
        let mut state = OnboardingState::new();
        assert!(state.next_screen());
        assert_eq!(state.current_screen, OnboardingScreen::ConnectAccounts);

        assert!(!state.next_screen());
        assert_eq!(state.current_screen, OnboardingScreen::ConnectAccounts);
        assert!(state.error_message.is_some());

        state.google_ads_connected = true;
        assert!(state.next_screen());
        assert_eq!(state.current_screen, OnboardingScreen::Complete);
        assert!(state.error_message.is_none());
    }

    #[test]
    fn meta_is_listed_but_unavailable() {
        assert!(!Platform::Meta.is_available());
        assert!(!Platform::Meta.is_required());
        assert!(Platform::GoogleAds.is_required());
    }

    #[test]
    fn previous_screen_stops_at_welcome() {
        let mut state = OnboardingState::new();
        state.previous_screen();
        assert_eq!(state.current_screen, OnboardingScreen::Welcome);
    }
}
